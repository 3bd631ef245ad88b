//! Alias curation from proposal to renormalized data

mod common;

use common::{record, seed_reviews, store};
use dishdive::alias::set_accept;
use dishdive::{
    apply_accepted, generate, normalize_all, AliasKind, ApplyOptions, BulkOptions, ClusterOptions,
    DomainStore, SourceRef,
};

#[test]
fn accepted_dish_merge_applies_after_reset() {
    let store = store();
    let mut reviews: Vec<_> = (0..5)
        .map(|i| (SourceRef::web(i), vec![record("ร้านตามสั่ง", "ผัดกระเพรา", &["อร่อย"], &[])]))
        .collect();
    reviews.push((SourceRef::web(10), vec![record("ร้านตามสั่ง", "ผัดกะเพรา", &[], &["เค็ม"])]));
    seed_reviews(&store, &reviews);

    normalize_all(&store, &BulkOptions::default()).unwrap();
    let restaurant = store.find_restaurant("ร้านตามสั่ง").unwrap().unwrap();
    assert!(store.find_dish(restaurant, "ผัดกะเพรา").unwrap().is_some());

    let report = generate(&store, AliasKind::Dish, &ClusterOptions::default()).unwrap();
    assert_eq!(report.merges, 1);
    let candidates = store.list_alias_candidates(AliasKind::Dish).unwrap();
    let variant = candidates.iter().find(|c| c.member == "ผัดกะเพรา").unwrap();
    assert_eq!(variant.canonical, "ผัดกระเพรา");

    // Nothing is applied until a curator accepts it
    let untouched = apply_accepted(&store, AliasKind::Dish, ApplyOptions::default()).unwrap();
    assert_eq!(untouched.mappings, 0);

    set_accept(&store, AliasKind::Dish, variant.cluster_id, None, true).unwrap();
    let applied = apply_accepted(&store, AliasKind::Dish, ApplyOptions::default()).unwrap();
    assert_eq!(applied.mappings, 1);
    assert_eq!(applied.identity, 1);

    let rerun = BulkOptions {
        reset: true,
        ..BulkOptions::default()
    };
    normalize_all(&store, &rerun).unwrap();

    assert!(store.find_dish(restaurant, "ผัดกะเพรา").unwrap().is_none());
    let merged = store.find_dish(restaurant, "ผัดกระเพรา").unwrap().unwrap();
    assert_eq!(merged.positive_score, 5);
    assert_eq!(merged.negative_score, 1);
    assert_eq!(store.counts().unwrap().review_dishes, 6);
}

#[test]
fn dry_run_leaves_mappings_alone() {
    let store = store();
    seed_reviews(
        &store,
        &[
            (SourceRef::web(1), vec![record("ร้านก", "ผัดกระเพรา", &[], &[])]),
            (SourceRef::web(2), vec![record("ร้านก", "ผัดกระเพรา", &[], &[])]),
            (SourceRef::web(3), vec![record("ร้านข", "ผัดกะเพรา", &[], &[])]),
        ],
    );
    normalize_all(&store, &BulkOptions::default()).unwrap();
    generate(&store, AliasKind::Dish, &ClusterOptions::default()).unwrap();

    let options = ApplyOptions {
        dry_run: true,
        include_rejected: true,
        ..ApplyOptions::default()
    };
    let report = apply_accepted(&store, AliasKind::Dish, options).unwrap();
    assert!(report.dry_run);
    assert_eq!(report.mappings, 1);
    assert!(store.load_alias_mappings(AliasKind::Dish).unwrap().is_empty());
}
