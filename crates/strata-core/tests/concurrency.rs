//! Concurrent annotation behavior over a shared file-backed store.
//!
//! Multiple connections (one per writer thread) exercise the WAL +
//! busy-timeout configuration the way concurrent analyzers and users do.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::thread;

use strata_core::acl::Actor;
use strata_core::annotate;
use strata_core::db::{open_metadata, sketches};
use strata_core::model::EventRef;

fn shared_workspace() -> (tempfile::TempDir, PathBuf, i64) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("metadata.sqlite3");
    let meta = open_metadata(&path).expect("open");

    let sketch = sketches::create(&meta, "shared case", "", "alice", 1).expect("sketch");
    for user in ["bob", "carol", "dave"] {
        sketches::add_collaborator(&meta, sketch.sketch_id, user, "alice", 2).expect("share");
    }
    (dir, path, sketch.sketch_id)
}

fn event() -> EventRef {
    EventRef::new("idx-0001", "ev-contested")
}

#[test]
fn concurrent_comments_all_land_with_unique_stable_order() {
    let (_dir, path, sketch_id) = shared_workspace();
    let writers = ["alice", "bob", "carol", "dave"];
    const PER_WRITER: usize = 5;

    let handles: Vec<_> = writers
        .iter()
        .map(|user| {
            let path = path.clone();
            let user = (*user).to_string();
            thread::spawn(move || {
                let meta = open_metadata(&path).expect("open per-thread");
                for n in 0..PER_WRITER {
                    annotate::add_comment(
                        &meta,
                        sketch_id,
                        &event(),
                        &format!("{user} note {n}"),
                        Actor::User(&user),
                        1_000 + i64::try_from(n).expect("small"),
                    )
                    .expect("comment");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread");
    }

    let meta = open_metadata(&path).expect("open");
    let annotations =
        annotate::list(&meta, sketch_id, &event(), "alice").expect("list");

    let total = writers.len() * PER_WRITER;
    assert_eq!(annotations.comments.len(), total, "no comment lost");

    let seqs: Vec<i64> = annotations.comments.iter().map(|c| c.seq).collect();
    let distinct: BTreeSet<i64> = seqs.iter().copied().collect();
    assert_eq!(distinct.len(), total, "no duplicate sequence numbers");
    assert_eq!(
        seqs,
        (1..=i64::try_from(total).expect("small")).collect::<Vec<_>>(),
        "server-assigned sequence is dense and ordered"
    );

    let bodies: BTreeSet<String> = annotations
        .comments
        .iter()
        .map(|c| c.body.clone())
        .collect();
    assert_eq!(bodies.len(), total, "every body retained exactly once");

    // A second read returns the identical order.
    let again = annotate::list(&meta, sketch_id, &event(), "alice").expect("list again");
    assert_eq!(annotations.comments, again.comments);
}

#[test]
fn concurrent_tag_writers_converge() {
    let (_dir, path, sketch_id) = shared_workspace();

    // Every writer adds the same two tags plus one of its own; add is
    // idempotent so the union is what must remain.
    let handles: Vec<_> = ["alice", "bob", "carol"]
        .iter()
        .map(|user| {
            let path = path.clone();
            let user = (*user).to_string();
            thread::spawn(move || {
                let meta = open_metadata(&path).expect("open per-thread");
                for _ in 0..10 {
                    annotate::add_tag(
                        &meta,
                        sketch_id,
                        &event(),
                        "suspicious",
                        Actor::User(&user),
                        10,
                    )
                    .expect("tag");
                    annotate::add_tag(&meta, sketch_id, &event(), "reviewed", Actor::User(&user), 11)
                        .expect("tag");
                }
                annotate::add_tag(
                    &meta,
                    sketch_id,
                    &event(),
                    &format!("by/{user}"),
                    Actor::User(&user),
                    12,
                )
                .expect("tag");
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread");
    }

    let meta = open_metadata(&path).expect("open");
    let annotations = annotate::list(&meta, sketch_id, &event(), "alice").expect("list");
    let expected: BTreeSet<String> = [
        "suspicious",
        "reviewed",
        "by/alice",
        "by/bob",
        "by/carol",
    ]
    .iter()
    .map(ToString::to_string)
    .collect();
    assert_eq!(annotations.tags, expected);
}

#[test]
fn stars_toggle_independently_per_user_under_concurrency() {
    let (_dir, path, sketch_id) = shared_workspace();

    let handles: Vec<_> = ["alice", "bob"]
        .iter()
        .map(|user| {
            let path = path.clone();
            let user = (*user).to_string();
            thread::spawn(move || {
                let meta = open_metadata(&path).expect("open per-thread");
                // Odd toggle count leaves the star on.
                for n in 0..3 {
                    annotate::toggle_star(&meta, sketch_id, &event(), &user, n)
                        .expect("toggle");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("toggle thread");
    }

    let meta = open_metadata(&path).expect("open");
    let annotations = annotate::list(&meta, sketch_id, &event(), "alice").expect("list");
    let expected: BTreeSet<String> =
        ["alice", "bob"].iter().map(ToString::to_string).collect();
    assert_eq!(annotations.starred_by, expected);
}
