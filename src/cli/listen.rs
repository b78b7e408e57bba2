//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了监听失效消息命令的实现。

use crate::cli::{load_service, ListenArgs};
use crate::sync::{bus_from_config, InvalidationHandler, InvalidationMessage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

struct PrintHandler;

#[async_trait]
impl InvalidationHandler for PrintHandler {
    async fn handle(&self, message: InvalidationMessage) {
        println!(
            "{}  origin={}  target={:?}",
            message.op, message.origin, message.target
        );
    }
}

pub async fn execute(args: &ListenArgs) -> Result<()> {
    let (_, service) = load_service(&args.config, &args.service)?;
    let bus = bus_from_config(&args.service, &service.bus)
        .await
        .context("Failed to connect to the message bus")?;

    bus.subscribe(Arc::new(PrintHandler)).await?;
    println!(
        "Listening on {} via {} (Ctrl-C to stop)...",
        service.bus.resolve_channel_name(&args.service),
        bus.name()
    );

    tokio::signal::ctrl_c().await?;
    bus.shutdown().await?;
    Ok(())
}
