use mongrid::{ConnectionRegistry, MongoConfig};

pub async fn ping(registry: &ConnectionRegistry, config: &MongoConfig) -> anyhow::Result<()> {
    let handle = registry.acquire(config).await?;
    println!(
        "✓ {} ready (handle {}, read timeout {:?}, write timeout {:?})",
        handle.key(),
        handle.id(),
        handle.read_timeout(),
        handle.write_timeout()
    );
    Ok(())
}
