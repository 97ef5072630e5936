#![cfg(unix)]

mod common;

use common::Harness;
use recon_jobs_rs::artifacts::{format_size, resolve};
use recon_jobs_rs::error::ScanError;

fn not_found<T: std::fmt::Debug>(r: Result<T, ScanError>) -> bool {
    matches!(r, Err(ScanError::NotFound(_)))
}

#[test]
fn byte_size_formatting() {
    assert_eq!(format_size(0), "0 Bytes");
    assert_eq!(format_size(1536), "1.5 KB");
    assert_eq!(format_size(1_048_576), "1 MB");
}

#[tokio::test]
async fn resolves_files_inside_the_job_directory_only() {
    let h = Harness::with_script(
        r#"echo '<html></html>' > "$5/report.html" && mkdir -p "$5/sub" && echo x > "$5/sub/a.txt""#,
    );
    let id = h.launcher.submit("example.com", "recon").unwrap();
    h.settle().await;
    let store = h.store().as_ref();

    let report = resolve(store, id, "report.html").expect("report resolves");
    assert!(report.ends_with("report.html"));
    assert!(resolve(store, id, "sub/../sub/a.txt").is_ok());
    assert!(resolve(store, id, "./report.html").is_ok());

    assert!(not_found(resolve(store, id, "../../etc/passwd")));
    assert!(not_found(resolve(store, id, "sub/../../escape")));
    assert!(not_found(resolve(store, id, "/etc/passwd")));
    assert!(not_found(resolve(store, id, "missing.png")));
    assert!(not_found(resolve(store, id, "sub")));
    assert!(not_found(resolve(store, id, "")));
    assert!(not_found(resolve(store, 999, "anything")));
}

#[tokio::test]
async fn symlink_out_of_the_job_directory_is_not_served() {
    let outside = tempfile::tempdir().unwrap();
    std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();
    let script = format!(
        r#"ln -s '{}' "$5/leak.txt""#,
        outside.path().join("secret.txt").display()
    );
    let h = Harness::with_script(&script);
    let id = h.launcher.submit("example.com", "recon").unwrap();
    h.settle().await;

    assert!(not_found(resolve(h.store().as_ref(), id, "leak.txt")));
}

#[tokio::test]
async fn running_job_without_output_is_not_found() {
    let h = Harness::with_script("sleep 1");
    let id = h.launcher.submit("example.com", "recon").unwrap();
    assert!(not_found(resolve(h.store().as_ref(), id, "report.html")));
    h.settle().await;
}
