mod common;

use arxiv_harvester::{
    CacheQuery, DailyCache, DailyLookup, DailySnapshot, FilterConfig, HarvestConfig,
    HarvestError, Harvester, RecordSet, SnapshotStore, Taxonomy,
};
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn cache_with(source: SetSource, root: &TempDir, config: HarvestConfig) -> DailyCache<SetSource> {
    let harvester = Arc::new(Harvester::new(source, config));
    let taxonomy = Arc::new(Taxonomy::builtin().unwrap());
    DailyCache::new(harvester, SnapshotStore::new(root.path()), taxonomy)
        .with_clock(Arc::new(|| at(2024, 3, 5, 12)))
}

fn cs_source() -> SetSource {
    SetSource::new()
        .with_page(
            "cs",
            simple_page(&["2403.00001", "2403.00002"], "cs.AI", None),
        )
        .with_page("math", simple_page(&["2403.00003"], "math.AG", None))
}

fn harvests(cache: &DailyCache<SetSource>) -> usize {
    cache.harvester().source().calls()
}

fn groups(names: &[&str]) -> CacheQuery {
    CacheQuery::Groups(names.iter().map(|s| s.to_string()).collect())
}

fn available(lookup: DailyLookup) -> RecordSet {
    match lookup {
        DailyLookup::Available(set) => set,
        DailyLookup::Unavailable => panic!("expected records"),
    }
}

#[tokio::test]
async fn test_incomplete_day_is_unavailable() {
    let root = TempDir::new().unwrap();
    let cache = cache_with(cs_source(), &root, fast_config());

    // the clock reads 2024-03-05 12:00 UTC
    for date in [day(2024, 3, 5), day(2024, 3, 6), day(2025, 1, 1)] {
        let lookup = cache.get_by_date(date, &groups(&["cs"])).await.unwrap();
        assert_eq!(lookup, DailyLookup::Unavailable);
    }
    assert!(cache.is_complete_day(day(2024, 3, 4)));
    assert_eq!(harvests(&cache), 0);
}

#[tokio::test]
async fn test_incomplete_day_ignores_existing_artifact() {
    let root = TempDir::new().unwrap();
    let store = SnapshotStore::new(root.path());
    store
        .save(&DailySnapshot::new(day(2024, 3, 5), "cs", RecordSet::new()))
        .await
        .unwrap();
    let cache = cache_with(cs_source(), &root, fast_config());

    let lookup = cache.get_by_date(day(2024, 3, 5), &groups(&["cs"])).await.unwrap();
    assert_eq!(lookup, DailyLookup::Unavailable);
}

#[tokio::test]
async fn test_miss_harvests_and_persists() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let cache = cache_with(cs_source(), &root, fast_config());

    let first = available(cache.get_by_date(day(2024, 3, 1), &groups(&["cs"])).await.unwrap());
    assert_eq!(first.len(), 2);
    assert!(cache.store().path_for("cs", day(2024, 3, 1)).exists());

    let second = available(cache.get_by_date(day(2024, 3, 1), &groups(&["cs"])).await.unwrap());
    assert_eq!(second, first);
    assert_eq!(harvests(&cache), 1);
    assert_eq!(cache.loaded_snapshots().await, 1);
}

#[tokio::test]
async fn test_persisted_snapshot_avoids_harvest() {
    let root = TempDir::new().unwrap();
    {
        let cache = cache_with(cs_source(), &root, fast_config());
        cache.get_by_date(day(2024, 3, 1), &groups(&["cs"])).await.unwrap();
    }

    // a fresh process sees the artifact but has an empty memory layer
    let cache = cache_with(cs_source(), &root, fast_config());
    let set = available(cache.get_by_date(day(2024, 3, 1), &groups(&["cs"])).await.unwrap());

    assert_eq!(set.len(), 2);
    assert_eq!(harvests(&cache), 0);
}

#[tokio::test]
async fn test_corrupt_artifact_is_reharvested() {
    let root = TempDir::new().unwrap();
    let cache = cache_with(cs_source(), &root, fast_config());
    let path = cache.store().path_for("cs", day(2024, 3, 1));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"\x00\x01truncated").unwrap();

    let set = available(cache.get_by_date(day(2024, 3, 1), &groups(&["cs"])).await.unwrap());

    assert_eq!(set.len(), 2);
    assert_eq!(harvests(&cache), 1);
}

#[tokio::test]
async fn test_concurrent_misses_share_one_harvest() {
    let root = TempDir::new().unwrap();
    let source = cs_source().with_delay(Duration::from_millis(50));
    let cache = Arc::new(cache_with(source, &root, fast_config()));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache.get_by_date(day(2024, 3, 1), &groups(&["cs"])).await
            })
        })
        .collect();

    for task in tasks {
        let set = available(task.await.unwrap().unwrap());
        assert_eq!(set.len(), 2);
    }
    assert_eq!(harvests(&cache), 1);
}

fn cross_listed_source() -> SetSource {
    SetSource::new()
        .with_page(
            "cs",
            page_xml(
                &[
                    PaperXml::new("2403.00001", "Agents", "cs.AI").to_xml(),
                    PaperXml::new("2403.00002", "Kernels", "cs.LG stat.ML").to_xml(),
                    PaperXml::new("2403.00003", "Meshes", "cs.CG").to_xml(),
                ],
                None,
            ),
        )
        .with_page(
            "stat",
            page_xml(
                &[
                    PaperXml::new("2403.00002", "Kernels", "cs.LG stat.ML").to_xml(),
                    PaperXml::new("2403.00004", "Priors", "stat.ME").to_xml(),
                ],
                None,
            ),
        )
}

#[tokio::test]
async fn test_categories_narrow_and_union_groups() {
    for concurrent in [false, true] {
        let root = TempDir::new().unwrap();
        let config = HarvestConfig {
            concurrent,
            ..fast_config()
        };
        let cache = cache_with(cross_listed_source(), &root, config);

        let query = CacheQuery::Categories(vec!["cs.AI".to_string(), "stat.ML".to_string()]);
        let set = available(cache.get_by_date(day(2024, 3, 1), &query).await.unwrap());

        let mut ids: Vec<&str> = set.ids().collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["2403.00001", "2403.00002"]);
        assert_eq!(harvests(&cache), 2);
        assert_eq!(cache.harvester().source().calls_for("stat"), 1);
    }
}

#[tokio::test]
async fn test_unknown_category_and_group() {
    let root = TempDir::new().unwrap();
    let cache = cache_with(cs_source(), &root, fast_config());

    let result = cache
        .get_by_date(day(2024, 3, 1), &CacheQuery::Categories(vec!["cs.XX".to_string()]))
        .await;
    assert!(matches!(result, Err(HarvestError::UnknownCategory(c)) if c == "cs.XX"));

    let result = cache.get_by_date(day(2024, 3, 1), &groups(&["biology"])).await;
    assert!(matches!(result, Err(HarvestError::UnknownCategoryGroup(_))));
    assert_eq!(harvests(&cache), 0);
}

#[tokio::test]
async fn test_failed_harvest_is_not_cached() {
    let root = TempDir::new().unwrap();
    let source = SetSource::new().with_page("cs", "<html>busy</html>".to_string());
    let config = HarvestConfig {
        max_retries: 1,
        ..fast_config()
    };
    let cache = cache_with(source, &root, config);

    let result = cache.get_by_date(day(2024, 3, 1), &groups(&["cs"])).await;

    assert!(matches!(result, Err(HarvestError::MalformedPage(_))));
    assert!(!cache.store().path_for("cs", day(2024, 3, 1)).exists());
    assert_eq!(cache.loaded_snapshots().await, 0);
}

#[tokio::test]
async fn test_query_applies_filter() {
    let source = SetSource::new().with_page(
        "cs",
        page_xml(
            &[
                PaperXml::new("2403.00001", "A transformer model", "cs.AI").to_xml(),
                PaperXml::new("2403.00002", "Graphs", "cs.AI").to_xml(),
                PaperXml::new("2403.00003", "Meshes", "cs.CG").to_xml(),
            ],
            None,
        ),
    );
    let root = TempDir::new().unwrap();
    let cache = cache_with(source, &root, fast_config());
    let filter = FilterConfig::from_toml_str(
        r#"
        categories = ["cs.AI"]
        keywords_in_title = ["transformer"]
        composition = "conjunctive"
        "#,
    )
    .unwrap();

    let set = available(cache.query(day(2024, 3, 1), &filter).await.unwrap());

    assert_eq!(set.ids().collect::<Vec<_>>(), vec!["2403.00001"]);
    assert_eq!(
        cache.query(day(2024, 3, 5), &filter).await.unwrap(),
        DailyLookup::Unavailable
    );
}
