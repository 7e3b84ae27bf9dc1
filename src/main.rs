use std::io::Write;

use edcp_server::server;

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s
        } else {
            "Unknown panic payload"
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "Unknown location".to_string());
        let now = chrono::Utc::now();

        eprintln!("[PANIC] 程序异常退出");
        eprintln!("位置: {}", location);
        eprintln!("原因: {}", message);
        tracing::error!(event = "panic.raised", location = %location, reason = %message);

        let panic_msg = format!(
            "PANIC OCCURRED\nLocation: {}\nReason: {}\nTime: {}\n\n",
            location, message, now
        );
        if std::fs::create_dir_all("./runtime/logs").is_ok() {
            let panic_file = format!("./runtime/logs/panic-{}.log", now.format("%Y%m%d-%H%M%S"));
            match std::fs::write(&panic_file, &panic_msg) {
                Ok(()) => eprintln!("[OK] Panic信息已保存到 {}", panic_file),
                Err(e) => eprintln!("[WARN] 无法写入panic日志: {}", e),
            }
        }

        std::io::stderr().flush().ok();
    }));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    install_panic_hook();

    let mut args = std::env::args();
    let _ = args.next();

    match args.next().as_deref() {
        Some("worker") | Some("--worker") => server::start_worker().await,
        Some("health-check") | Some("--health-check") => {
            let report = server::check_system_health().await?;
            println!(
                "健康检查: overall={}, status_store={}, storage={}",
                report.overall_healthy, report.status_store_healthy, report.storage_healthy
            );
            if !report.overall_healthy {
                std::process::exit(1);
            }
            Ok(())
        }
        _ => server::start_server().await,
    }
}
