use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::db;

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/timetable.sqlite3";
pub const BUNDLE_FORMAT: &str = "timetable-workspace-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub db_sha256: String,
}

/// Bundle the workspace database into a zip: manifest.json carrying the
/// format tag and the db checksum, plus the database file itself.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(db::DB_FILE_NAME);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("failed to read database {}", db_path.to_string_lossy()))?;
    let db_sha256 = sha256_hex(&db_bytes);

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "dbSha256": db_sha256,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    zip.write_all(&db_bytes)
        .context("failed to write database entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        db_sha256,
    })
}

/// Restore a bundle into the workspace, replacing its database. The
/// extracted bytes must match the manifest checksum before the existing
/// database is touched; a mismatched or truncated bundle leaves the
/// workspace as it was.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let expected_sha = manifest
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest missing dbSha256"))?
        .to_string();

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .with_context(|| format!("bundle missing {}", DB_ENTRY))?
        .read_to_end(&mut db_bytes)
        .context("failed to extract database entry")?;

    let actual_sha = sha256_hex(&db_bytes);
    if actual_sha != expected_sha {
        return Err(anyhow!(
            "bundle checksum mismatch: manifest says {}, database is {}",
            expected_sha,
            actual_sha
        ));
    }

    // Stage next to the target so the final step is a rename, not a
    // partial write over the live database.
    let dst = workspace_path.join(db::DB_FILE_NAME);
    let tmp_dst = workspace_path.join(format!("{}.importing", db::DB_FILE_NAME));
    if tmp_dst.exists() {
        let _ = std::fs::remove_file(&tmp_dst);
    }
    std::fs::write(&tmp_dst, &db_bytes).with_context(|| {
        format!(
            "failed to write extracted database {}",
            tmp_dst.to_string_lossy()
        )
    })?;
    if dst.exists() {
        std::fs::remove_file(&dst).with_context(|| {
            format!(
                "failed to remove existing database {}",
                dst.to_string_lossy()
            )
        })?;
    }
    std::fs::rename(&tmp_dst, &dst).with_context(|| {
        format!(
            "failed to move extracted database to {}",
            dst.to_string_lossy()
        )
    })?;

    Ok(ImportSummary {
        db_sha256: actual_sha,
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn seed_workspace() -> PathBuf {
        let ws = temp_dir("timetable-bundle-src");
        let conn = crate::db::open_db(&ws).expect("open workspace");
        conn.execute(
            "INSERT INTO users(id, username, password_hash, display_name, created_at)
             VALUES('u1', 'casey', 'hash', 'Casey', '2026-01-01T00:00:00Z')",
            [],
        )
        .expect("seed user");
        ws
    }

    #[test]
    fn bundle_round_trips_the_database() {
        let src = seed_workspace();
        let bundle = temp_dir("timetable-bundle-out").join("backup.ttbundle");
        let exported = export_workspace_bundle(&src, &bundle).expect("export");

        let dst = temp_dir("timetable-bundle-dst");
        let imported = import_workspace_bundle(&bundle, &dst).expect("import");
        assert_eq!(imported.db_sha256, exported.db_sha256);

        let conn = crate::db::open_db(&dst).expect("open imported workspace");
        let username: String = conn
            .query_row("SELECT username FROM users WHERE id = 'u1'", [], |r| {
                r.get(0)
            })
            .expect("user row survived");
        assert_eq!(username, "casey");
    }

    #[test]
    fn checksum_mismatch_rejects_bundle_and_keeps_workspace() {
        let src = seed_workspace();

        // Hand-build a bundle whose manifest lies about the checksum.
        let bundle_dir = temp_dir("timetable-bundle-bad");
        let bundle = bundle_dir.join("tampered.ttbundle");
        let out = File::create(&bundle).expect("create bundle");
        let mut zip = ZipWriter::new(out);
        let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(MANIFEST_ENTRY, opts).expect("manifest entry");
        zip.write_all(
            serde_json::to_string(&json!({
                "format": BUNDLE_FORMAT,
                "version": 1,
                "dbSha256": "0000000000000000000000000000000000000000000000000000000000000000",
            }))
            .expect("manifest json")
            .as_bytes(),
        )
        .expect("write manifest");
        zip.start_file(DB_ENTRY, opts).expect("db entry");
        zip.write_all(&std::fs::read(src.join(crate::db::DB_FILE_NAME)).expect("db bytes"))
            .expect("write db");
        zip.finish().expect("finish zip");

        let dst = seed_workspace();
        let before = std::fs::read(dst.join(crate::db::DB_FILE_NAME)).expect("db before");
        let err = import_workspace_bundle(&bundle, &dst).expect_err("must reject");
        assert!(err.to_string().contains("checksum mismatch"));
        let after = std::fs::read(dst.join(crate::db::DB_FILE_NAME)).expect("db after");
        assert_eq!(before, after);
    }

    #[test]
    fn wrong_format_tag_is_rejected() {
        let bundle_dir = temp_dir("timetable-bundle-fmt");
        let bundle = bundle_dir.join("other.zip");
        let out = File::create(&bundle).expect("create bundle");
        let mut zip = ZipWriter::new(out);
        let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(MANIFEST_ENTRY, opts).expect("manifest entry");
        zip.write_all(br#"{"format":"someone-elses-bundle"}"#)
            .expect("write manifest");
        zip.finish().expect("finish zip");

        let dst = temp_dir("timetable-bundle-fmt-dst");
        let err = import_workspace_bundle(&bundle, &dst).expect_err("must reject");
        assert!(err.to_string().contains("unsupported bundle format"));
    }
}
