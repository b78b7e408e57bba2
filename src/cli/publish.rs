use crate::cli::{load_service, OpArg, PublishArgs};
use crate::config::BusBackend;
use crate::sync::{bus_from_config, InvalidationMessage, NodeId};
use anyhow::{bail, Context, Result};

pub async fn execute(args: &PublishArgs) -> Result<()> {
    let (_, service) = load_service(&args.config, &args.service)?;
    if service.bus.backend == BusBackend::None {
        bail!(
            "Service '{}' has no message bus configured; nothing to publish to",
            args.service
        );
    }

    // 使用新的节点标识，所有节点（包括本机进程）都会应用这条消息
    let origin = NodeId::random();
    let message = match (args.op, args.target.as_deref()) {
        (OpArg::ClearAll, _) => InvalidationMessage::clear_all(origin),
        (OpArg::RemoveKey, Some(key)) => InvalidationMessage::remove_key(origin, key),
        (OpArg::RemovePrefix, Some(prefix)) => InvalidationMessage::remove_by_prefix(origin, prefix),
        (_, None) => bail!("A key or prefix is required for {:?}", args.op),
    };

    let bus = bus_from_config(&args.service, &service.bus)
        .await
        .context("Failed to connect to the message bus")?;
    tokio::time::timeout(service.bus.publish_timeout(), bus.publish(&message))
        .await
        .context("Publish timed out")??;

    println!(
        "✅ Published {} '{}' on {}",
        message.op,
        message.target,
        service.bus.resolve_channel_name(&args.service)
    );
    bus.shutdown().await?;
    Ok(())
}
