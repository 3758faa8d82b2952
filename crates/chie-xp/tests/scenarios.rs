//! End-to-end grant, level and leaderboard scenarios on RocksDB.

use chie_xp::{
    ActionKind, EngineConfig, ExperienceEngine, ExperienceStore, RankMode, RankingAggregator,
    RocksStore, UserId,
};
use std::path::Path;
use std::sync::Arc;

fn open(path: &Path) -> (ExperienceEngine, RankingAggregator) {
    let store: Arc<dyn ExperienceStore> = Arc::new(RocksStore::open(path).unwrap());
    (
        ExperienceEngine::new(Arc::clone(&store), EngineConfig::default()),
        RankingAggregator::new(store),
    )
}

fn uid(s: &str) -> UserId {
    UserId::parse(s).unwrap()
}

#[test]
fn articles_and_comments_reach_eighty() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _) = open(dir.path());
    let alice = uid("alice");

    for _ in 0..5 {
        engine.grant(&alice, ActionKind::CreateKnowledge).unwrap();
    }
    for _ in 0..3 {
        engine.grant(&alice, ActionKind::CreateComment).unwrap();
    }

    let progress = engine.progress(&alice).unwrap();
    assert_eq!(progress.total_xp, 80);
    assert_eq!(progress.level, 1);
    assert_eq!(progress.current_level_xp, 80);
    assert_eq!(progress.xp_to_next_level, 20);

    let history = engine.history(&alice, 100, 0).unwrap();
    assert_eq!(history.len(), 8);
    assert!(history.windows(2).all(|w| w[0].entry_id > w[1].entry_id));
}

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let bob = uid("bob");

    let last_id = {
        let (engine, _) = open(dir.path());
        for _ in 0..15 {
            engine.grant(&bob, ActionKind::CreateComment).unwrap();
        }
        engine.history(&bob, 1, 0).unwrap()[0].entry_id
    };

    let (engine, ranking) = open(dir.path());
    let aggregate = engine.aggregate(&bob).unwrap();
    assert_eq!(aggregate.total_xp, 150);
    assert_eq!(aggregate.level, 2);
    assert_eq!(aggregate.current_level_xp, 50);
    assert_eq!(aggregate.xp_to_next_level, 150);

    let next = engine.grant(&bob, ActionKind::CreateComment).unwrap();
    assert!(next.entry_id > last_id);
    assert!(engine.audit(&bob).unwrap().is_consistent());
    assert_eq!(ranking.rank_of(&bob).unwrap(), 1);
}

#[test]
fn leaderboard_orders_ties_by_user_id() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, ranking) = open(dir.path());

    for (name, grants) in [("C", 15), ("B", 30), ("A", 30)] {
        let user = uid(name);
        for _ in 0..grants {
            engine.grant(&user, ActionKind::CreateKnowledge).unwrap();
        }
    }

    let rows = ranking.leaderboard(10, 0).unwrap();
    let order: Vec<_> = rows.iter().map(|r| (r.user_id.as_str(), r.rank, r.level)).collect();
    assert_eq!(order, vec![("A", 1, 3), ("B", 2, 3), ("C", 3, 2)]);

    let shared = ranking.leaderboard_with(10, 0, RankMode::Shared).unwrap();
    assert_eq!(
        shared.iter().map(|r| r.rank).collect::<Vec<_>>(),
        vec![1, 1, 3]
    );

    // C overtakes both
    for _ in 0..20 {
        engine.grant(&uid("C"), ActionKind::CreateComment).unwrap();
    }
    assert_eq!(ranking.rank_of(&uid("C")).unwrap(), 1);
    assert_eq!(ranking.rank_of(&uid("B")).unwrap(), 3);

    let second_page = ranking.leaderboard(2, 2).unwrap();
    assert_eq!(second_page.len(), 1);
    assert_eq!(second_page[0].user_id.as_str(), "B");
    assert_eq!(second_page[0].rank, 3);
}

#[test]
fn unknown_action_names_change_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, ranking) = open(dir.path());
    let carol = uid("carol");

    assert!(matches!(
        engine.grant_named(&carol, "DELETE_EVERYTHING"),
        Err(chie_xp::Error::UnknownActionKind(_))
    ));
    assert!(engine.aggregate(&carol).is_err());
    assert!(ranking.leaderboard(10, 0).unwrap().is_empty());

    let result = engine.grant_named(&carol, "create_knowledge").unwrap();
    assert_eq!(result.new_total_xp, 10);
}
