#![cfg(unix)]

mod common;

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use common::Env;
use rotguard_core::FileStatus;
use rotguard_core::parity::par2::Par2Parity;

/// Stand-in for par2cmdline that behaves like it where names matter: the
/// recovery set remembers the protected file's name, and a file under any
/// other name fails verification. Volumes hold a plain copy of the content.
/// Content damage exits with the code found in `damage_rc` (1 by default).
const STAND_IN: &str = r#"#!/bin/sh
for a in "$@"; do last="$a"; done
case "$1" in
create)
    idx="$6"
    basename "$last" > "$idx"
    cat "$last" > "${idx%.par2}.vol000+01.par2"
    ;;
verify)
    idx="$5"
    [ "$(cat "$idx")" = "$(basename "$last")" ] || exit 1
    if [ "$(cat "$last")" != "$(cat "${idx%.par2}.vol000+01.par2")" ]; then
        exit "$(cat "$(dirname "$0")/damage_rc" 2>/dev/null || echo 1)"
    fi
    ;;
repair)
    idx="$5"
    mv "$last" "$last.1"
    cat "${idx%.par2}.vol000+01.par2" > "$4/$(cat "$idx")"
    ;;
esac
"#;

fn par2(env: &Env) -> Par2Parity {
    let script = env.tmp.path().join("par2");
    fs::write(&script, STAND_IN).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    Par2Parity::with_program(env.layout.clone(), script, Duration::from_secs(30))
}

fn set_damage_rc(dir: &Path, rc: i32) {
    fs::write(dir.join("damage_rc"), rc.to_string()).unwrap();
}

#[test]
fn copies_and_renames_share_one_recovery_set() {
    let env = Env::new();
    let svc = par2(&env);
    env.write("photos/a.jpg", b"content_a");
    assert_eq!(env.scan_with(&svc).parity_created, 1);

    fs::copy(env.path("photos/a.jpg"), env.path("photos/b.jpg")).unwrap();
    let s = env.scan_with(&svc);
    assert_eq!(s.new, 1);
    assert_eq!(s.parity_created, 0);

    let s = env.scan_with(&svc);
    assert_eq!(s.verified, 2);
    assert_eq!(s.damaged, 0);
    assert!(s.errors.is_empty(), "{:?}", s.errors);
    assert_eq!(env.record("photos/b.jpg").unwrap().status, FileStatus::Ok);

    env.rename("photos/a.jpg", "archive/renamed.jpg");
    assert_eq!(env.scan_with(&svc).moved, 1);
    let s = env.scan_with(&svc);
    assert_eq!(s.verified, 2);
    assert_eq!(s.damaged, 0);
    assert_eq!(
        env.record("archive/renamed.jpg").unwrap().status,
        FileStatus::Ok
    );
    assert_eq!(env.artifacts().len(), 1);
}

#[test]
fn damage_beyond_the_recovery_blocks_is_still_damage() {
    let env = Env::new();
    let svc = par2(&env);
    set_damage_rc(env.tmp.path(), 2);
    env.write("photos/a.jpg", b"content_a");
    env.scan_with(&svc);

    env.rot("photos/a.jpg", b"content_X");
    let s = env.scan_with(&svc);
    assert_eq!(s.damaged, 1);
    assert!(s.errors.is_empty(), "{:?}", s.errors);
    assert_eq!(
        env.record("photos/a.jpg").unwrap().status,
        FileStatus::Damaged
    );
}

#[test]
fn repaired_copy_restores_content_without_touching_the_artifact() {
    let env = Env::new();
    let svc = par2(&env);
    env.write("photos/a.jpg", b"content_a");
    env.write("photos/b.jpg", b"content_a");
    env.scan_with(&svc);
    let artifact = env.record("photos/a.jpg").unwrap().parity_ref();

    env.rot("photos/b.jpg", b"content_X");
    assert_eq!(env.scan_with(&svc).damaged, 1);

    let s = env.repair_with(&svc);
    assert_eq!(s.repaired, 1);
    assert_eq!(s.parity_recreated, 0);
    assert_eq!(fs::read(env.path("photos/b.jpg")).unwrap(), b"content_a");
    assert!(env.layout.exists(&artifact));

    let s = env.scan_with(&svc);
    assert_eq!(s.damaged, 0);
    assert_eq!(s.verified, 2);
    assert_eq!(env.record("photos/a.jpg").unwrap().status, FileStatus::Ok);
    assert_eq!(env.record("photos/b.jpg").unwrap().status, FileStatus::Ok);
}
