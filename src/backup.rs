use crate::classroom::ClassroomState;
use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const STATE_ENTRY: &str = "state/classroom.json";
pub const BUNDLE_FORMAT_V1: &str = "classbook-snapshot-v1";
pub const PLAIN_JSON_FORMAT: &str = "plain-json";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub group_count: usize,
}

/// A decoded snapshot that breaks the store's rules. Nothing is swapped in.
#[derive(Debug, thiserror::Error)]
#[error("snapshot rejected: {}", .problems.join("; "))]
pub struct SnapshotRejected {
    pub problems: Vec<String>,
}

/// Drops stored `Pending` attendance and refuses snapshots the mutation
/// paths could never have produced.
fn checked_snapshot(mut state: ClassroomState) -> anyhow::Result<ClassroomState> {
    let dropped = state.attendance.drop_pending();
    if dropped > 0 {
        tracing::warn!(dropped, "dropped stored pending attendance from snapshot");
    }
    let problems = state.integrity_problems();
    if !problems.is_empty() {
        tracing::warn!(problems = problems.len(), "snapshot failed integrity checks");
        return Err(SnapshotRejected { problems }.into());
    }
    Ok(state)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn export_snapshot_bundle(
    state: &ClassroomState,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let snapshot =
        serde_json::to_vec_pretty(state).context("failed to serialize classroom snapshot")?;
    let checksum = sha256_hex(&snapshot);

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "entries": {
            "state/classroom.json": { "sha256": checksum, "bytes": snapshot.len() },
        },
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(STATE_ENTRY, opts)
        .context("failed to start snapshot entry")?;
    zip.write_all(&snapshot)
        .context("failed to write snapshot entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    tracing::info!(
        path = %out_path.to_string_lossy(),
        groups = state.groups.len(),
        "exported snapshot bundle"
    );
    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 2,
        sha256: checksum,
    })
}

/// Reads a bundle written by [`export_snapshot_bundle`], or a bare
/// `ClassroomState` JSON file. The caller decides whether to swap it in.
pub fn import_snapshot_bundle(in_path: &Path) -> anyhow::Result<(ClassroomState, ImportSummary)> {
    if !is_zip_file(in_path)? {
        let text = std::fs::read_to_string(in_path)
            .with_context(|| format!("failed to read {}", in_path.to_string_lossy()))?;
        let state: ClassroomState =
            serde_json::from_str(&text).context("file is neither a bundle nor snapshot JSON")?;
        let state = checked_snapshot(state)?;
        let summary = ImportSummary {
            bundle_format_detected: PLAIN_JSON_FORMAT.to_string(),
            group_count: state.groups.len(),
        };
        return Ok((state, summary));
    }

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
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let expected = manifest
        .pointer(&format!("/entries/{}/sha256", STATE_ENTRY.replace('/', "~1")))
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest.json has no checksum for {}", STATE_ENTRY))?
        .to_string();

    let mut snapshot = Vec::new();
    archive
        .by_name(STATE_ENTRY)
        .with_context(|| format!("bundle missing {}", STATE_ENTRY))?
        .read_to_end(&mut snapshot)
        .context("failed to extract snapshot entry")?;

    let actual = sha256_hex(&snapshot);
    if actual != expected {
        return Err(anyhow!(
            "checksum mismatch for {}: manifest {}, content {}",
            STATE_ENTRY,
            expected,
            actual
        ));
    }

    let state: ClassroomState =
        serde_json::from_slice(&snapshot).context("snapshot entry is not valid classroom JSON")?;
    let state = checked_snapshot(state)?;
    tracing::info!(
        path = %in_path.to_string_lossy(),
        groups = state.groups.len(),
        "imported snapshot bundle"
    );
    let summary = ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
        group_count: state.groups.len(),
    };
    Ok((state, summary))
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classroom::StudentInput;
    use crate::model::{AttendanceStatus, Weekday};
    use chrono::NaiveDate;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> std::path::PathBuf {
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

    fn sample() -> ClassroomState {
        let mut state = ClassroomState::default();
        state
            .create_group(
                Some("g1".into()),
                "Math 3C",
                "Math",
                [Weekday::Wednesday].into_iter().collect(),
            )
            .expect("group");
        state
            .add_student(
                "g1",
                StudentInput {
                    id: Some("s1".into()),
                    name: "Ana".into(),
                    matricula: None,
                },
            )
            .expect("student");
        state.attendance.set(
            "g1",
            "s1",
            NaiveDate::from_ymd_opt(2024, 9, 4).expect("date"),
            AttendanceStatus::Late,
        );
        state
    }

    #[test]
    fn bundle_roundtrip_preserves_snapshot() {
        let dir = temp_dir("classbook-backup-roundtrip");
        let bundle = dir.join("out/snapshot.zip");
        let state = sample();
        let exported = export_snapshot_bundle(&state, &bundle).expect("export");
        assert_eq!(exported.bundle_format, BUNDLE_FORMAT_V1);

        let (restored, summary) = import_snapshot_bundle(&bundle).expect("import");
        assert_eq!(summary.bundle_format_detected, BUNDLE_FORMAT_V1);
        assert_eq!(summary.group_count, 1);
        assert_eq!(
            serde_json::to_value(&restored).expect("ser"),
            serde_json::to_value(&state).expect("ser")
        );
    }

    #[test]
    fn tampered_snapshot_is_rejected() {
        let dir = temp_dir("classbook-backup-tamper");
        let bundle = dir.join("snapshot.zip");
        export_snapshot_bundle(&sample(), &bundle).expect("export");

        // Rewrite the bundle with the original manifest but edited content.
        let mut manifest = String::new();
        {
            let mut archive =
                ZipArchive::new(File::open(&bundle).expect("open")).expect("zip");
            archive
                .by_name(MANIFEST_ENTRY)
                .expect("manifest")
                .read_to_string(&mut manifest)
                .expect("read");
        }
        let tampered = dir.join("tampered.zip");
        let mut zip = ZipWriter::new(File::create(&tampered).expect("create"));
        let opts = FileOptions::default();
        zip.start_file(MANIFEST_ENTRY, opts).expect("start");
        zip.write_all(manifest.as_bytes()).expect("write");
        zip.start_file(STATE_ENTRY, opts).expect("start");
        zip.write_all(br#"{"groups":[]}"#).expect("write");
        zip.finish().expect("finish");

        let err = import_snapshot_bundle(&tampered).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn plain_json_is_accepted() {
        let dir = temp_dir("classbook-backup-plain");
        let path = dir.join("state.json");
        std::fs::write(&path, serde_json::to_vec(&sample()).expect("ser")).expect("write");
        let (state, summary) = import_snapshot_bundle(&path).expect("import");
        assert_eq!(summary.bundle_format_detected, PLAIN_JSON_FORMAT);
        assert_eq!(state.groups[0].id, "g1");
    }

    fn snapshot_json(score: f64, type_id: &str) -> serde_json::Value {
        json!({
            "groups": [{
                "id": "g1",
                "name": "Math 3C",
                "classDays": ["Wednesday"],
                "students": [{ "id": "s1", "name": "Ana" }],
                "evaluationTypes": { "partial1": [{ "id": "exam", "name": "Exams", "weight": 100 }] }
            }],
            "attendance": { "g1": { "s1": { "2024-09-04": "pending", "2024-09-11": "present" } } },
            "grades": {
                "evaluations": { "g1": [{ "id": "e1", "name": "Quiz", "maxScore": 10, "partial": 1, "typeId": type_id }] },
                "grades": { "g1": { "s1": { "e1": score } } }
            }
        })
    }

    #[test]
    fn out_of_range_scores_and_missing_types_are_refused() {
        let dir = temp_dir("classbook-backup-unsound");
        let path = dir.join("state.json");
        std::fs::write(&path, snapshot_json(50.0, "homework").to_string()).expect("write");

        let err = import_snapshot_bundle(&path).unwrap_err();
        let rejected = err.downcast_ref::<SnapshotRejected>().expect("rejection");
        assert_eq!(rejected.problems.len(), 2, "{:?}", rejected.problems);
        assert!(rejected.problems.iter().any(|p| p.contains("type 'homework'")));
        assert!(rejected.problems.iter().any(|p| p.contains("score 50")));
    }

    #[test]
    fn stored_pending_attendance_is_dropped_on_import() {
        let dir = temp_dir("classbook-backup-pending");
        let path = dir.join("state.json");
        std::fs::write(&path, snapshot_json(7.0, "exam").to_string()).expect("write");

        let (state, _) = import_snapshot_bundle(&path).expect("import");
        let record = state.attendance.student_record("g1", "s1").expect("record");
        assert_eq!(record.len(), 1);
        assert_eq!(
            state.attendance.get("g1", "s1", NaiveDate::from_ymd_opt(2024, 9, 11).expect("date")),
            AttendanceStatus::Present
        );
        assert_eq!(state.grades.grade("g1", "s1", "e1"), Some(7.0));
    }
}
