use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// 安装全局Prometheus指标导出器，需要在tokio运行时内调用
pub fn install_prometheus_exporter(bind_address: &str) -> Result<SocketAddr> {
    let address: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {bind_address}"))?;

    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .context("安装Prometheus指标导出器失败")?;

    info!("Prometheus指标导出器已启动: http://{}/metrics", address);
    Ok(address)
}
