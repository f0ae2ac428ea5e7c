use mongrid::mongodb::bson::Document;
use mongrid::{ConnectionRegistry, MembershipGroup, MongoConfig};

use super::{Target, parse_pair, print_documents};

pub async fn find_in(
    registry: &ConnectionRegistry,
    config: &MongoConfig,
    target: &Target,
    negate: bool,
    groups: &[String],
) -> anyhow::Result<()> {
    let groups = parse_groups(groups)?;
    let handle = registry.acquire(config).await?;
    let documents: Vec<Document> = handle
        .find_where_in(&target.db, &target.coll, negate, &groups)
        .await?;
    print_documents(documents)
}

/// `field=v1,v2` → group of string values. An empty value list matches nothing.
pub fn parse_groups(args: &[String]) -> anyhow::Result<Vec<MembershipGroup>> {
    args.iter()
        .map(|arg| {
            let (field, values) = parse_pair(arg)?;
            let values: Vec<&str> = values.split(',').filter(|v| !v.is_empty()).collect();
            Ok(MembershipGroup::new(&field, values))
        })
        .collect()
}
