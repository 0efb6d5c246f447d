//! End-to-end behaviour of the hub: staging, committing, diffing, tags and
//! access checks.

mod common;

use common::{branch, main_branch, path, Fixture};
use datagit::access::{Actor, Visibility};
use datagit::hub::{CreateRepository, HubError, RepoPath, Revision};
use datagit::staging::WipStatus;
use datagit::storage::{
    BlobId, CancelToken, Change, ChangeAction, EntryKind, ObjectPath, RefSpec, TagName,
};
use datagit::ErrorKind;

fn commit_rev(id: datagit::storage::CommitId) -> Revision {
    Revision::Ref(RefSpec::Commit(id))
}

#[test]
fn test_put_then_commit_round_trips_bytes() {
    let fx = Fixture::new();
    let main = main_branch();
    let payload = vec![0u8, 159, 146, 150, 7];

    fx.hub.open_wip(&fx.alice, &fx.repo, &main).unwrap();
    let info = fx.hub.put_object(&fx.alice, &fx.repo, &main, &path("a.bin"), &payload).unwrap();
    assert_eq!(info.size, 5);
    fx.hub.commit_wip(&fx.alice, &fx.repo, &main, "add a.bin").unwrap();

    let object = fx
        .hub
        .get_object(&fx.alice, &fx.repo, &Revision::branch(main), &path("a.bin"))
        .unwrap();
    assert_eq!(object.bytes, payload);
    assert_eq!(object.info.hash, info.hash);
}

#[test]
fn test_identical_payloads_share_a_hash() {
    let fx = Fixture::new();
    let main = main_branch();
    fx.hub.open_wip(&fx.alice, &fx.repo, &main).unwrap();

    let put = |p: &str| fx.hub.put_object(&fx.alice, &fx.repo, &main, &path(p), b"1,2,3").unwrap();
    let first = put("x/one.csv");
    let second = put("y/two.csv");
    assert_eq!(first.hash, second.hash);
    assert_eq!(first.etag, second.etag);
    assert_eq!(first.checksum, second.checksum);
}

#[test]
fn test_second_commit_on_the_same_wip_fails() {
    let fx = Fixture::new();
    let main = main_branch();
    fx.hub.open_wip(&fx.alice, &fx.repo, &main).unwrap();
    fx.hub.put_object(&fx.alice, &fx.repo, &main, &path("a.dat"), b"a").unwrap();
    fx.hub.commit_wip(&fx.alice, &fx.repo, &main, "first").unwrap();

    let err = fx.hub.commit_wip(&fx.alice, &fx.repo, &main, "second").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_open_wip_creates_then_returns_existing() {
    let fx = Fixture::new();
    let main = main_branch();

    let (first, status) = fx.hub.open_wip(&fx.alice, &fx.repo, &main).unwrap();
    assert_eq!(status, WipStatus::Created);
    assert_eq!(first.creator, "alice");

    let (second, status) = fx.hub.open_wip(&fx.alice, &fx.repo, &main).unwrap();
    assert_eq!(status, WipStatus::Existing);
    assert_eq!(second.base, first.base);
    assert_eq!(second.tree, first.tree);
}

#[test]
fn test_open_wip_on_missing_branch_is_not_found() {
    let fx = Fixture::new();
    let err = fx.hub.open_wip(&fx.alice, &fx.repo, &branch("nope")).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_diff_between_commits() {
    let fx = Fixture::new();
    let main = main_branch();
    let before = fx.commit(&main, &[("a.dat", Some("a")), ("g/m.dat", Some("m1"))], "before");
    let after = fx.commit(
        &main,
        &[
            ("a.dat", None),
            ("g/m.dat", Some("m2")),
            ("g/x.dat", Some("x")),
            ("m.dat", Some("m")),
        ],
        "after",
    );

    let changes = fx
        .hub
        .diff(&fx.alice, &fx.repo, &commit_rev(before.id), &commit_rev(after.id), None)
        .unwrap();
    assert_eq!(
        changes,
        vec![
            Change::new(path("a.dat"), ChangeAction::Deleted),
            Change::new(path("g/m.dat"), ChangeAction::Modified),
            Change::new(path("g/x.dat"), ChangeAction::Added),
            Change::new(path("m.dat"), ChangeAction::Added),
        ]
    );

    let scoped = fx
        .hub
        .diff(&fx.alice, &fx.repo, &commit_rev(before.id), &commit_rev(after.id), Some(&path("g")))
        .unwrap();
    assert_eq!(scoped.len(), 2);

    let nowhere = fx
        .hub
        .diff(
            &fx.alice,
            &fx.repo,
            &commit_rev(before.id),
            &commit_rev(after.id),
            Some(&path("zzz")),
        )
        .unwrap();
    assert!(nowhere.is_empty());
}

#[test]
fn test_diff_of_a_revision_with_itself_is_empty() {
    let fx = Fixture::new();
    let main = main_branch();
    fx.commit(&main, &[("a.dat", Some("a")), ("g/m.dat", Some("m"))], "seed");

    let rev = Revision::branch(main);
    assert!(fx.hub.diff(&fx.alice, &fx.repo, &rev, &rev, None).unwrap().is_empty());
}

#[test]
fn test_diff_against_a_wip() {
    let fx = Fixture::new();
    let main = main_branch();
    fx.commit(&main, &[("a.dat", Some("a"))], "seed");

    fx.hub.open_wip(&fx.alice, &fx.repo, &main).unwrap();
    fx.hub.put_object(&fx.alice, &fx.repo, &main, &path("b.dat"), b"b").unwrap();

    let changes = fx
        .hub
        .diff(
            &fx.alice,
            &fx.repo,
            &Revision::branch(main.clone()),
            &Revision::Wip(main.clone()),
            None,
        )
        .unwrap();
    assert_eq!(changes, vec![Change::new(path("b.dat"), ChangeAction::Added)]);
    assert_eq!(fx.hub.wip_changes(&fx.alice, &fx.repo, &main, None).unwrap(), changes);
}

#[test]
fn test_list_children_of_a_directory() {
    let fx = Fixture::new();
    let main = main_branch();
    let files = [("g/x.dat", Some("x")), ("g/m.dat", Some("m")), ("top.dat", Some("t"))];
    fx.commit(&main, &files, "seed");

    let rev = Revision::branch(main);
    let names: Vec<String> = fx
        .hub
        .list_objects(&fx.alice, &fx.repo, &rev, Some(&path("g")))
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["m.dat", "x.dat"]);

    let root = fx.hub.list_objects(&fx.alice, &fx.repo, &rev, None).unwrap();
    assert_eq!(root.len(), 2);
    assert_eq!(root[0].name, "g");
    assert_eq!(root[0].kind, EntryKind::Tree);
}

#[test]
fn test_deleting_a_missing_path_fails() {
    let fx = Fixture::new();
    let main = main_branch();
    fx.hub.open_wip(&fx.alice, &fx.repo, &main).unwrap();

    let err = fx.hub.delete_object(&fx.alice, &fx.repo, &main, &path("ghost.dat")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_git_directory_names_are_bad_requests() {
    let fx = Fixture::new();
    let main = main_branch();
    fx.hub.open_wip(&fx.alice, &fx.repo, &main).unwrap();

    for bad in [".git", "d/.git/x", "d/.GIT", "git~1"] {
        let err = ObjectPath::new(bad).map_err(HubError::from).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest, "{}", bad);
    }

    // the wip is untouched and still accepts ordinary dot files
    fx.hub.put_object(&fx.alice, &fx.repo, &main, &path("d/.gitkeep"), b"").unwrap();
    let commit = fx.hub.commit_wip(&fx.alice, &fx.repo, &main, "keep").unwrap();
    let object = fx
        .hub
        .stat_object(&fx.alice, &fx.repo, &commit_rev(commit.id), &path("d/.gitkeep"))
        .unwrap();
    assert_eq!(object.size, 0);
}

#[test]
fn test_object_exists_and_build_tree() {
    let fx = Fixture::new();
    let main = main_branch();
    let commit = fx.commit(&main, &[("g/x.dat", Some("x")), ("m.dat", Some("m"))], "seed");
    let rev = commit_rev(commit.id);

    let x = fx.hub.stat_object(&fx.alice, &fx.repo, &rev, &path("g/x.dat")).unwrap().hash;
    let m = fx.hub.stat_object(&fx.alice, &fx.repo, &rev, &path("m.dat")).unwrap().hash;
    assert!(fx.hub.object_exists(&fx.alice, &fx.repo, x).unwrap());

    let tree = fx
        .hub
        .build_tree(&fx.alice, &fx.repo, vec![(path("m.dat"), m), (path("g/x.dat"), x)])
        .unwrap();
    assert_eq!(tree, commit.tree_id);

    let unknown = BlobId::from_hex("5555555555555555555555555555555555555555").unwrap();
    assert!(!fx.hub.object_exists(&fx.alice, &fx.repo, unknown).unwrap());
    let err = fx
        .hub
        .build_tree(&fx.alice, &fx.repo, vec![(path("u.dat"), unknown)])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // outsiders learn nothing about a private repository
    let err = fx.hub.object_exists(&fx.bob, &fx.repo, x).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[test]
fn test_stat_and_read_through_the_wip() {
    let fx = Fixture::new();
    let main = main_branch();
    fx.commit(&main, &[("a.dat", Some("old"))], "seed");

    fx.hub.open_wip(&fx.alice, &fx.repo, &main).unwrap();
    fx.hub.put_object(&fx.alice, &fx.repo, &main, &path("a.dat"), b"newer").unwrap();

    let wip = Revision::Wip(main.clone());
    let info = fx.hub.stat_object(&fx.alice, &fx.repo, &wip, &path("a.dat")).unwrap();
    assert_eq!(info.size, 5);
    assert_eq!(fx.read(&main, "a.dat"), b"old");

    fx.hub.discard_wip(&fx.alice, &fx.repo, &main).unwrap();
    let err = fx.hub.get_wip(&fx.alice, &fx.repo, &main).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_tags() {
    let fx = Fixture::new();
    let main = main_branch();
    let commit = fx.commit(&main, &[("a.dat", Some("a"))], "seed");
    let v1 = TagName::new("v1").unwrap();

    let tag = fx
        .hub
        .create_tag(&fx.alice, &fx.repo, &v1, &Revision::branch(main.clone()), "first release")
        .unwrap();
    assert_eq!(tag.target, commit.id);
    let stored = fx.hub.get_tag(&fx.alice, &fx.repo, &v1).unwrap();
    assert_eq!(stored.message.trim_end(), "first release");

    let dup = fx
        .hub
        .create_tag(&fx.alice, &fx.repo, &v1, &Revision::branch(main.clone()), "again")
        .unwrap_err();
    assert!(dup.is_conflict());

    let missing = fx
        .hub
        .create_tag(
            &fx.alice,
            &fx.repo,
            &TagName::new("v2").unwrap(),
            &Revision::branch(branch("nope")),
            "x",
        )
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);

    let too_long = TagName::new("v".repeat(41)).unwrap_err();
    assert_eq!(HubError::from(too_long).kind(), ErrorKind::BadRequest);

    let object = fx
        .hub
        .get_object(&fx.alice, &fx.repo, &Revision::Ref(RefSpec::Tag(v1.clone())), &path("a.dat"))
        .unwrap();
    assert_eq!(object.bytes, b"a");

    fx.hub.delete_tag(&fx.alice, &fx.repo, &v1).unwrap();
    assert!(fx.hub.list_tags(&fx.alice, &fx.repo).unwrap().is_empty());
}

#[test]
fn test_branches() {
    let fx = Fixture::new();
    let main = main_branch();
    let seed = fx.commit(&main, &[("a.dat", Some("a"))], "seed");
    let dev = branch("dev");

    let created = fx
        .hub
        .create_branch(&fx.alice, &fx.repo, &dev, &Revision::branch(main.clone()))
        .unwrap();
    assert_eq!(created.commit, seed.id);
    let names: Vec<String> = fx
        .hub
        .list_branches(&fx.alice, &fx.repo)
        .unwrap()
        .into_iter()
        .map(|b| b.name.to_string())
        .collect();
    assert_eq!(names, vec!["dev", "main"]);

    let dup = fx
        .hub
        .create_branch(&fx.alice, &fx.repo, &dev, &Revision::branch(main.clone()))
        .unwrap_err();
    assert!(dup.is_conflict());

    let default = fx.hub.delete_branch(&fx.alice, &fx.repo, &main).unwrap_err();
    assert_eq!(default.kind(), ErrorKind::BadRequest);

    fx.hub.open_wip(&fx.alice, &fx.repo, &dev).unwrap();
    fx.hub.delete_branch(&fx.alice, &fx.repo, &dev).unwrap();
    assert!(fx.hub.get_branch(&fx.alice, &fx.repo, &dev).unwrap_err().is_not_found());
    assert!(fx.hub.list_wips(&fx.alice, &fx.repo).unwrap().is_empty());
}

#[test]
fn test_commit_history_pages() {
    let fx = Fixture::new();
    let main = main_branch();
    for i in 0..5 {
        let content = i.to_string();
        fx.commit(&main, &[("counter.dat", Some(content.as_str()))], &format!("commit {}", i));
    }
    let rev = Revision::branch(main);
    let cancel = CancelToken::new();

    let first = fx.hub.list_commits(&fx.alice, &fx.repo, &rev, None, Some(4), &cancel).unwrap();
    assert_eq!(first.commits.len(), 4);
    assert_eq!(first.commits[0].message, "commit 4");
    let cursor = first.next.unwrap().to_string();

    let second = fx
        .hub
        .list_commits(&fx.alice, &fx.repo, &rev, Some(&cursor), Some(4), &cancel)
        .unwrap();
    // commit 0 and the initial commit
    assert_eq!(second.commits.len(), 2);
    assert!(second.next.is_none());

    let bad = fx
        .hub
        .list_commits(&fx.alice, &fx.repo, &rev, Some("garbage"), None, &cancel)
        .unwrap_err();
    assert_eq!(bad.kind(), ErrorKind::BadRequest);
    let zero = fx.hub.list_commits(&fx.alice, &fx.repo, &rev, None, Some(0), &cancel).unwrap_err();
    assert_eq!(zero.kind(), ErrorKind::BadRequest);
}

#[test]
fn test_private_repository_access() {
    let fx = Fixture::new();
    let main = Revision::branch(main_branch());

    let outsider = fx.hub.list_objects(&fx.bob, &fx.repo, &main, None).unwrap_err();
    assert_eq!(outsider.kind(), ErrorKind::Unauthorized);

    let anonymous = fx.hub.list_objects(&Actor::Anonymous, &fx.repo, &main, None).unwrap_err();
    assert_eq!(anonymous.kind(), ErrorKind::Unauthorized);

    let absent_repo = RepoPath::new("alice", "missing").unwrap();
    let err = fx.hub.list_objects(&Actor::Anonymous, &absent_repo, &main, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let absent_owner = RepoPath::new("nobody", "data").unwrap();
    let err = fx.hub.list_objects(&fx.bob, &absent_owner, &main, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_public_repository_is_readable_but_not_writable() {
    let fx = Fixture::with_options(CreateRepository {
        description: Some("open data".to_string()),
        visibility: Visibility::Public,
    });
    let main = main_branch();
    fx.commit(&main, &[("a.dat", Some("a"))], "seed");

    let object = fx
        .hub
        .get_object(&Actor::Anonymous, &fx.repo, &Revision::branch(main.clone()), &path("a.dat"))
        .unwrap();
    assert_eq!(object.bytes, b"a");

    let err = fx.hub.open_wip(&fx.bob, &fx.repo, &main).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[test]
fn test_repository_lifecycle() {
    let fx = Fixture::new();

    let elsewhere = RepoPath::new("bob", "data").unwrap();
    let err = fx
        .hub
        .create_repository(&fx.alice, &elsewhere, CreateRepository::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let dup = fx
        .hub
        .create_repository(&fx.alice, &fx.repo, CreateRepository::default())
        .unwrap_err();
    assert!(dup.is_conflict());

    assert_eq!(fx.hub.list_repositories(&fx.alice, None).unwrap().len(), 1);
    assert!(fx.hub.list_repositories(&fx.bob, None).unwrap().is_empty());

    fx.hub.delete_repository(&fx.alice, &fx.repo).unwrap();
    assert!(fx.hub.get_repository(&fx.alice, &fx.repo).unwrap_err().is_not_found());

    // the name is free again
    fx.hub
        .create_repository(&fx.alice, &fx.repo, CreateRepository::default())
        .unwrap();
}
