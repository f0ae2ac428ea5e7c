use anyhow::bail;
use mongrid::mongodb::bson::Document;
use mongrid::{ConnectionRegistry, MongoConfig, SearchQuery, SortDirection};

use super::{Target, parse_pair, print_documents};

pub async fn search(
    registry: &ConnectionRegistry,
    config: &MongoConfig,
    target: &Target,
    query: &SearchQuery,
    count_only: bool,
) -> anyhow::Result<()> {
    let handle = registry.acquire(config).await?;
    if count_only {
        let total = handle.search_count(&target.db, &target.coll, query).await?;
        println!("{total}");
        return Ok(());
    }
    let documents: Vec<Document> = handle.search(&target.db, &target.coll, query).await?;
    print_documents(documents)
}

pub fn build_query(
    equals: &[String],
    like: &[String],
    sort: &[String],
    limit: u64,
    skip: u64,
) -> anyhow::Result<SearchQuery> {
    let mut query = SearchQuery::new().limit(limit).skip(skip);
    for arg in equals {
        let (field, value) = parse_pair(arg)?;
        query = query.equals(&field, &value);
    }
    for arg in like {
        let (field, pattern) = parse_pair(arg)?;
        query = query.contains(&field, &pattern);
    }
    for arg in sort {
        let (field, direction) = parse_sort(arg)?;
        query = query.sort_by(field, direction);
    }
    Ok(query)
}

fn parse_sort(arg: &str) -> anyhow::Result<(&str, SortDirection)> {
    let (field, direction) = match arg.split_once(':') {
        Some((field, "asc")) => (field, SortDirection::Ascending),
        Some((field, "desc")) => (field, SortDirection::Descending),
        Some((_, other)) => bail!("unknown sort direction {other:?}, expected asc or desc"),
        None => (arg, SortDirection::Ascending),
    };
    if field.is_empty() {
        bail!("sort key needs a field name");
    }
    Ok((field, direction))
}
