// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 压缩静态文件服务器
//!
//! 基于 Tokio 运行时的多线程服务器，把每个连接上的请求交给 [`StaticGzip`] 中间件：
//! - 可压缩的资源以 gzip/deflate 编码返回，并缓存在进程内存中
//! - 其余请求交给 [`FsSender`] 原样发送
//! - 中间件不处理的方法返回 405，前缀之外的路径返回 404，读取源文件失败返回 500
//! - 后台管理控制台（CLI 指令交互）

use gzip_static::{
    cache::store_from_capacity,
    config::{Config, GzipOptions},
    middleware::{Flow, StaticGzip},
    param::HttpRequestMethod,
    request::Request,
    response::Response,
    sender::FsSender,
};

use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    runtime::Builder,
    sync::Notify,
};

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    process,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Instant,
};

/// 请求头的最大长度
const MAX_HEAD_SIZE: usize = 8 * 1024;

type Middleware = StaticGzip<FsSender>;

enum RequestHead {
    Complete(Vec<u8>),
    TooLarge,
    Closed,
}

fn main() {
    // 1. 日志系统：log4rs 通过外部 YAML 配置级别与输出目的地
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        eprintln!("无法初始化日志系统：{}", e);
        process::exit(1);
    }

    // 2. 配置加载
    let config = match Config::from_toml("config/development.toml") {
        Ok(config) => config,
        Err(e) => {
            error!("配置文件载入失败：{}", e);
            process::exit(1);
        }
    };
    info!("配置文件已载入");

    // 3. 中间件构造：根目录或正则不合法时立即失败
    let options = match GzipOptions::from_config(&config) {
        Ok(options) => options,
        Err(e) => {
            error!("无法构造压缩中间件：{}", e);
            process::exit(1);
        }
    };
    info!("www root: {}", options.root().display());
    let store = store_from_capacity(config.cache_capacity());
    let sender = FsSender::new(options.root(), options.prefix());
    let middleware = Arc::new(StaticGzip::new(options, store, sender));

    // 4. 运行时：按配置分配工作线程数
    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法创建Tokio运行时：{}", e);
            process::exit(1);
        }
    };
    runtime.block_on(serve(config, middleware));
}

async fn serve(config: Config, middleware: Arc<Middleware>) {
    let port = config.port();
    let address = match config.local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    info!("服务端将在{}:{}上监听Socket连接", address, port);
    let listener = match TcpListener::bind(SocketAddrV4::new(address, port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("无法绑定端口：{}，错误：{}", port, e);
            return;
        }
    };
    info!("端口{}绑定完成", port);

    let shutdown = Arc::new(Notify::new());
    let active_connection = Arc::new(AtomicU32::new(0));
    tokio::spawn(console(Arc::clone(&shutdown), Arc::clone(&active_connection)));

    let mut id: u128 = 0;
    loop {
        let (stream, addr) = tokio::select! {
            _ = shutdown.notified() => {
                info!("主循环接收到停机指令，正在退出...");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("接受连接失败：{}", e);
                    continue;
                }
            },
        };
        debug!("[ID{}]TCP连接已建立：{}", id, addr);

        let middleware = Arc::clone(&middleware);
        let active_connection = Arc::clone(&active_connection);
        tokio::spawn(async move {
            active_connection.fetch_add(1, Ordering::SeqCst);
            handle_connection(stream, id, &middleware).await;
            active_connection.fetch_sub(1, Ordering::SeqCst);
        });
        id += 1;
    }
}

/// 后台管理控制台
async fn console(shutdown: Arc<Notify>, active_connection: Arc<AtomicU32>) {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        match input.trim() {
            "stop" => {
                println!("停机指令已激活，服务器将停止接受新连接...");
                shutdown.notify_one();
                break;
            }
            "status" => {
                println!("== gzip-static 状态 ===");
                println!("当前活跃连接数: {}", active_connection.load(Ordering::SeqCst));
                println!("======================");
            }
            "help" => {
                println!("== gzip-static Help ==");
                println!("stop   - 发出停机信号");
                println!("status - 查看当前服务器运行状态");
                println!("help   - 显示此帮助信息");
                println!("======================");
            }
            cmd => println!("无效的命令：{}", cmd),
        }
    }
}

async fn read_request_head(stream: &mut TcpStream, id: u128) -> RequestHead {
    let mut head = Vec::with_capacity(1024);
    let mut buffer = [0u8; 1024];
    loop {
        let n = match stream.read(&mut buffer).await {
            Ok(0) => return RequestHead::Closed,
            Ok(n) => n,
            Err(e) => {
                error!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
                return RequestHead::Closed;
            }
        };
        head.extend_from_slice(&buffer[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") {
            return RequestHead::Complete(head);
        }
        if head.len() > MAX_HEAD_SIZE {
            return RequestHead::TooLarge;
        }
    }
}

/// # 连接处理器
///
/// 每个连接只处理一个请求：读取请求头，交给中间件，再为落到链尾的请求生成响应。
async fn handle_connection(mut stream: TcpStream, id: u128, middleware: &Middleware) {
    let buffer = match read_request_head(&mut stream, id).await {
        RequestHead::Complete(buffer) => buffer,
        RequestHead::TooLarge => {
            warn!("[ID{}]请求头超过{}字节，返回413", id, MAX_HEAD_SIZE);
            let _ = Response::from_status_code(413, None).write_to(&mut stream).await;
            return;
        }
        RequestHead::Closed => return,
    };
    let start_time = Instant::now();

    let request = match Request::try_from(&buffer, id) {
        Ok(request) => request,
        Err(e) => {
            warn!("[ID{}]解析HTTP请求失败: {}，返回400", id, e);
            let _ = Response::from_status_code(400, None).write_to(&mut stream).await;
            return;
        }
    };
    debug!("[ID{}]成功解析HTTP请求", id);

    let outcome = match middleware.handle(&request, &mut stream, id).await {
        Ok(Flow::Handled) => "handled".to_string(),
        Ok(Flow::Next) => {
            let response = match request.method() {
                HttpRequestMethod::Get | HttpRequestMethod::Head => {
                    let mut response = Response::from_status_code(404, Some("你指定的文件无法找到。"));
                    if request.method() == HttpRequestMethod::Head {
                        response.drop_body();
                    }
                    response
                }
                _ => {
                    let mut response = Response::from_status_code(405, None);
                    response.set_header("Allow", "GET, HEAD");
                    response
                }
            };
            finish(&response, &mut stream, id).await
        }
        Err(e) if e.headers_sent() => {
            error!("[ID{}]响应中途失败：{}，关闭连接", id, e);
            return;
        }
        Err(e) => {
            error!("[ID{}]处理请求时发生异常: {}，返回500", id, e);
            let response = Response::from_status_code(500, Some("读取源文件时发生错误。"));
            finish(&response, &mut stream, id).await
        }
    };

    info!(
        "[ID{}] {}, {}, {}, {}, {}ms, {}",
        id,
        request.version(),
        request.path(),
        request.method(),
        outcome,
        start_time.elapsed().as_millis(),
        request.user_agent(),
    );
    let _ = stream.shutdown().await;
}

async fn finish(response: &Response, stream: &mut TcpStream, id: u128) -> String {
    if let Err(e) = response.write_to(stream).await {
        error!("[ID{}]发送响应失败: {}", id, e);
    }
    format!("{} {}", response.status_code(), response.information())
}
