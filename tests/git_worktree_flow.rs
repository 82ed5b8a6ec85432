use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use lazywt::core::cache::{SharedCaches, get_cached_details};
use lazywt::core::git::{CancelToken, Git, GitPort};
use lazywt::core::scan::WorktreeScanner;

fn git_available() -> bool {
    Command::new("git").arg("--version").output().is_ok()
}

fn run(dir: &Path, args: &[&str]) {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git command");
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
}

/// Repository with one commit on `main`; returns (tempdir, canonical repo path).
fn init_repo() -> (tempfile::TempDir, PathBuf) {
    let td = tempfile::tempdir().expect("tempdir");
    let repo = td.path().join("repo");
    std::fs::create_dir_all(&repo).expect("mkdir repo");
    run(&repo, &["init"]);
    run(&repo, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    run(&repo, &["config", "user.email", "test@example.com"]);
    run(&repo, &["config", "user.name", "Test"]);
    std::fs::write(repo.join("README.md"), "hello\n").expect("write");
    run(&repo, &["add", "."]);
    run(&repo, &["commit", "-m", "init"]);
    let repo = std::fs::canonicalize(&repo).expect("canonical repo");
    (td, repo)
}

#[test]
fn create_rename_and_delete_worktree() {
    if !git_available() {
        eprintln!("skipping: git not found");
        return;
    }
    let (_td, repo) = init_repo();
    let cancel = CancelToken::new();
    let git = Git::from_dir(&repo).expect("git from dir");
    let base = repo.parent().expect("parent").to_path_buf();

    let path = base.join("wts").join("feature-test");
    git.create_worktree(&path, "feature/test", Some("main"), true, &cancel)
        .expect("create worktree");
    let listed = git.list_worktrees(&cancel).expect("list");
    assert_eq!(listed.len(), 2);
    assert!(listed[0].is_main);
    assert!(listed.iter().any(|w| w.branch == "feature/test" && !w.is_main));

    std::fs::write(path.join("notes.txt"), "wip\n").expect("write untracked");
    let files = git.status_porcelain_v2(&path, &cancel).expect("status");
    assert_eq!(files.len(), 1);
    assert!(files[0].is_untracked);

    let renamed = base.join("wts").join("renamed");
    git.rename_worktree(&path, &renamed, &cancel).expect("move");
    git.rename_branch(&renamed, "feature/test", "renamed", &cancel)
        .expect("rename branch");
    let listed = git.list_worktrees(&cancel).expect("list");
    assert!(listed.iter().any(|w| w.branch == "renamed"));
    assert!(!listed.iter().any(|w| w.branch == "feature/test"));

    // Untracked content needs force.
    assert!(git.delete_worktree(&renamed, false, &cancel).is_err());
    git.delete_worktree(&renamed, true, &cancel).expect("force delete");
    git.delete_branch("renamed", &cancel).expect("delete branch");
    assert_eq!(git.list_worktrees(&cancel).expect("list").len(), 1);
    assert!(!git.list_branches(&cancel).expect("branches").contains(&"renamed".to_owned()));
}

#[tokio::test(flavor = "multi_thread")]
async fn scan_counts_changes_and_details_read_log() {
    if !git_available() {
        eprintln!("skipping: git not found");
        return;
    }
    let (_td, repo) = init_repo();
    let cancel = CancelToken::new();
    let git: Arc<dyn GitPort> = Arc::new(Git::from_dir(&repo).expect("git from dir"));
    std::fs::write(repo.join("README.md"), "changed\n").expect("modify");
    std::fs::write(repo.join("new.txt"), "new\n").expect("untracked");

    let scanned = WorktreeScanner::new(Arc::clone(&git), 2)
        .scan(&cancel)
        .await
        .expect("scan");
    assert_eq!(scanned.len(), 1);
    let main = &scanned[0];
    assert_eq!(main.branch, "main");
    assert_eq!(main.modified(), 1);
    assert_eq!(main.untracked(), 1);
    assert!(main.last_active_ts > 0);

    let caches = SharedCaches::new();
    let details = get_cached_details(&caches, &git, &repo, "main", &cancel)
        .await
        .expect("details");
    assert!(details.log_raw.contains("init"));
    assert!(details.status_raw.contains("README.md"));
    assert!(details.unmerged.is_empty());
}
