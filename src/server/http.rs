//! HTTP服务器设置模块
//! 负责创建和配置HTTP服务器

use crate::api::routes;
use crate::util::config::ServerConfig;
use crate::AppState;
use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

/// HTTP服务器管理器
pub struct ServerManager;

impl ServerManager {
    /// 创建HTTP服务器
    pub async fn create_server(config: &ServerConfig, app_state: AppState) -> Result<HttpServer> {
        info!(
            target: "server.http",
            event = "http.server.create",
            "创建HTTP服务器"
        );

        let listener = Self::bind_listener(&config.host, config.port).await?;
        let local_addr = listener.local_addr()?;

        info!(
            target: "server.http",
            event = "http.router.build"
        );
        let app_routes = routes(app_state, config);

        info!(
            target: "server.http",
            event = "http.server.ready",
            address = %local_addr
        );

        Ok(HttpServer {
            listener,
            app_routes,
            local_addr,
        })
    }

    /// 绑定监听地址
    async fn bind_listener(host: &str, port: u16) -> Result<TcpListener> {
        let address = format!("{}:{}", host, port);
        info!(
            target: "server.http",
            event = "http.server.bind_start",
            address = %address
        );
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("端口绑定失败: {}", address))?;
        info!(
            target: "server.http",
            event = "http.server.bound",
            address = %address
        );
        Ok(listener)
    }

    /// 启动服务器，收到退出信号后优雅关闭
    pub async fn start_server(server: HttpServer) -> Result<()> {
        info!(
            target: "server.http",
            event = "http.server.start",
            address = %server.local_addr
        );

        axum::serve(server.listener, server.app_routes)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP服务器已关闭");
        Ok(())
    }
}

/// 等待 Ctrl+C 或 SIGTERM
pub async fn shutdown_signal() {
    info!(
        target: "server.http",
        event = "http.server.shutdown_wait"
    );

    tokio::select! {
        _ = ctrl_c() => {
            info!(
                target: "server.http",
                event = "http.server.signal",
                signal = "SIGINT"
            );
        }
        _ = wait_for_sigterm() => {
            info!(
                target: "server.http",
                event = "http.server.signal",
                signal = "SIGTERM"
            );
        }
    }

    info!(
        target: "server.http",
        event = "http.server.shutdown_begin"
    );
}

async fn wait_for_sigterm() {
    #[cfg(unix)]
    {
        match signal(SignalKind::terminate()) {
            Ok(mut term_signal) => {
                term_signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}

/// HTTP服务器实例
pub struct HttpServer {
    listener: TcpListener,
    app_routes: Router,
    local_addr: std::net::SocketAddr,
}

impl HttpServer {
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }
}
