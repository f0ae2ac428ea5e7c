use mongrid::mongodb::bson::doc;
use mongrid::{ConnectionRegistry, MongoConfig};

use super::Target;

pub async fn count(
    registry: &ConnectionRegistry,
    config: &MongoConfig,
    target: &Target,
    estimated: bool,
) -> anyhow::Result<()> {
    let handle = registry.acquire(config).await?;
    let total = if estimated {
        handle.estimated_count(&target.db, &target.coll, None).await?
    } else {
        handle.count(&target.db, &target.coll, doc! {}, None).await?
    };
    println!("{total}");
    Ok(())
}
