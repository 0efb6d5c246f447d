//! Archives, cancellation, concurrency and reopening a hub.

mod common;

use std::sync::Mutex;
use std::thread;

use common::{branch, main_branch, path, Fixture};
use datagit::access::{Actor, Group};
use datagit::hub::{
    ArchiveEncoder, ArchiveEntry, ArchiveFormat, Hub, HubConfig, Revision, UpdateRepository,
};
use datagit::staging::WipStatus;
use datagit::storage::{CancelToken, UserName};
use datagit::ErrorKind;

/// writes `path=len` lines and remembers what it was handed
#[derive(Default)]
struct ListingEncoder {
    seen: Mutex<Vec<String>>,
}

impl ArchiveEncoder for ListingEncoder {
    fn encode(
        &self,
        format: ArchiveFormat,
        entries: Vec<ArchiveEntry>,
    ) -> std::io::Result<Vec<u8>> {
        let mut out = format!("{}\n", format).into_bytes();
        let mut seen = self.seen.lock().unwrap();
        for entry in entries {
            out.extend_from_slice(format!("{}={}\n", entry.path, entry.bytes.len()).as_bytes());
            seen.push(entry.path.to_string());
        }
        Ok(out)
    }
}

#[test]
fn test_archive_lists_files_in_path_order() {
    let fx = Fixture::new();
    let main = main_branch();
    let files = [("z.dat", Some("zz")), ("a/b.dat", Some("b")), ("a.dat", Some("aaa"))];
    let commit = fx.commit(&main, &files, "seed");
    let encoder = ListingEncoder::default();

    let archive = fx
        .hub
        .get_archive(
            &fx.alice,
            &fx.repo,
            &Revision::branch(main),
            ArchiveFormat::Zip,
            &encoder,
            &CancelToken::new(),
        )
        .unwrap();

    assert_eq!(*encoder.seen.lock().unwrap(), vec!["a.dat", "a/b.dat", "z.dat"]);
    assert_eq!(archive.bytes, b"zip\na.dat=3\na/b.dat=1\nz.dat=2\n");
    assert_eq!(archive.content_length, archive.bytes.len() as u64);
    assert_eq!(archive.commit, Some(commit.id));
    assert_eq!(archive.file_name, format!("data-{}.zip", commit.id.short()));
}

#[test]
fn test_archive_of_a_wip_and_of_nothing() {
    let fx = Fixture::new();
    let main = main_branch();
    fx.hub.open_wip(&fx.alice, &fx.repo, &main).unwrap();
    fx.hub.put_object(&fx.alice, &fx.repo, &main, &path("staged.dat"), b"s").unwrap();

    let archive = fx
        .hub
        .get_archive(
            &fx.alice,
            &fx.repo,
            &Revision::Wip(main.clone()),
            ArchiveFormat::Car,
            &ListingEncoder::default(),
            &CancelToken::new(),
        )
        .unwrap();
    assert_eq!(archive.commit, None);
    assert_eq!(archive.file_name, "data-main-wip.car");
    assert_eq!(archive.bytes, b"car\nstaged.dat=1\n");

    let err = fx
        .hub
        .get_archive(
            &fx.alice,
            &fx.repo,
            &Revision::name("no-such-ref"),
            ArchiveFormat::Zip,
            &ListingEncoder::default(),
            &CancelToken::new(),
        )
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_cancelled_archive_leaves_refs_alone() {
    let fx = Fixture::new();
    let main = main_branch();
    let head = fx.commit(&main, &[("a.dat", Some("a"))], "seed");
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = fx
        .hub
        .get_archive(
            &fx.alice,
            &fx.repo,
            &Revision::branch(main.clone()),
            ArchiveFormat::Zip,
            &ListingEncoder::default(),
            &cancel,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(fx.hub.get_branch(&fx.alice, &fx.repo, &main).unwrap().commit, head.id);
}

#[test]
fn test_concurrent_open_creates_exactly_one_wip() {
    let fx = Fixture::new();
    let main = main_branch();

    let statuses: Vec<WipStatus> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let hub = fx.hub.clone();
                let (actor, repo, main) = (fx.alice.clone(), fx.repo.clone(), main.clone());
                s.spawn(move || hub.open_wip(&actor, &repo, &main).unwrap().1)
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(statuses.iter().filter(|s| **s == WipStatus::Created).count(), 1);
    assert_eq!(fx.hub.list_wips(&fx.alice, &fx.repo).unwrap().len(), 1);
}

#[test]
fn test_stale_wip_is_rebased_on_commit() {
    let fx = Fixture::new();
    let main = main_branch();
    fx.commit(&main, &[("a.dat", Some("a"))], "seed");

    let bob = UserName::new("bob").unwrap();
    fx.hub.invite_member(&fx.alice, &fx.repo, &bob, Group::Write).unwrap();
    fx.hub.open_wip(&fx.bob, &fx.repo, &main).unwrap();
    fx.hub.put_object(&fx.bob, &fx.repo, &main, &path("bob.dat"), b"b").unwrap();

    // the branch moves underneath the open WIP through a merge
    let side = common::branch("side");
    fx.hub
        .create_branch(&fx.alice, &fx.repo, &side, &Revision::branch(main.clone()))
        .unwrap();
    let side_tip = fx.commit(&side, &[("side.dat", Some("s"))], "side work");
    fx.hub
        .merge(&fx.alice, &fx.repo, &side, &main, None, Default::default())
        .unwrap();

    let commit = fx.hub.commit_wip(&fx.bob, &fx.repo, &main, "bob's file").unwrap();
    assert_eq!(commit.parent_ids, vec![side_tip.id]);
    assert_eq!(fx.read(&main, "side.dat"), b"s");
    assert_eq!(fx.read(&main, "bob.dat"), b"b");
}

#[test]
fn test_registry_survives_reopen() {
    let fx = Fixture::new();
    let main = main_branch();
    fx.commit(&main, &[("a.dat", Some("a"))], "seed");
    fx.hub
        .invite_member(&fx.alice, &fx.repo, &UserName::new("bob").unwrap(), Group::Read)
        .unwrap();
    let root = fx.dir.path().to_path_buf();
    drop(fx.hub);

    let hub = Hub::open(HubConfig::new(&root).create_if_missing(false)).unwrap();
    let alice = Actor::user(UserName::new("alice").unwrap());
    let bob = Actor::user(UserName::new("bob").unwrap());

    let record = hub.get_repository(&bob, &fx.repo).unwrap();
    assert_eq!(record.head, main);
    let object = hub
        .get_object(&alice, &fx.repo, &Revision::branch(main), &path("a.dat"))
        .unwrap();
    assert_eq!(object.bytes, b"a");
}

#[test]
fn test_failed_settings_write_keeps_git_head() {
    let fx = Fixture::new();
    let dev = branch("dev");
    fx.hub
        .create_branch(&fx.alice, &fx.repo, &dev, &Revision::branch(main_branch()))
        .unwrap();

    // a directory where the registry file goes makes every registry write fail
    let registry = fx.dir.path().join("registry.json");
    std::fs::remove_file(&registry).unwrap();
    std::fs::create_dir(&registry).unwrap();

    let update = UpdateRepository {
        head: Some(dev),
        ..Default::default()
    };
    let err = fx.hub.update_repository(&fx.alice, &fx.repo, update).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);

    let git = git2::Repository::open_bare(fx.dir.path().join("repos/alice/data.git")).unwrap();
    assert_eq!(git.head().unwrap().name(), Some("refs/heads/main"));
    assert_eq!(fx.hub.get_repository(&fx.alice, &fx.repo).unwrap().head, main_branch());
}

#[test]
fn test_in_memory_registry_and_missing_root() {
    let dir = tempfile::TempDir::new().unwrap();
    let missing = dir.path().join("absent");
    let err = Hub::open(HubConfig::new(&missing).create_if_missing(false)).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);

    let hub = Hub::open(HubConfig::new(dir.path()).persist_registry(false)).unwrap();
    hub.create_user(&UserName::new("alice").unwrap(), Some("alice@example.com"))
        .unwrap();
    assert!(!dir.path().join("registry.json").exists());
}
