//! CLI route table against a saved ledger

use super::test_utils::{pipeline, spawn, strike, with_isolated_env};
use annal::cli::{Commands, RunContext};
use annal::store::{FileLedgerStore, LedgerStore};
use annal::LedgerError;
use tempfile::TempDir;

/// Save a small ledger at the default store path of `workspace`.
fn seed_workspace(workspace: &TempDir) {
    let pipeline = pipeline();
    let a = spawn(&pipeline, 20, 0);
    let b = spawn(&pipeline, 20, 0);
    for _ in 0..3 {
        pipeline.submit(strike(a, b)).unwrap();
    }
    FileLedgerStore::new(workspace.path().join(".annal").join("ledger"))
        .save(pipeline.ledger())
        .unwrap();
}

fn run(workspace: &TempDir, command: Commands) -> Result<String, LedgerError> {
    RunContext::new(workspace.path().to_path_buf(), None)?.execute(&command)
}

#[test]
fn test_inspect_and_verify() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    with_isolated_env(&test_dir, || {
        seed_workspace(&workspace);

        let inspect = run(&workspace, Commands::Inspect).unwrap();
        assert!(inspect.contains("Tip: 5"));
        assert!(inspect.contains("Frames: 6"));
        assert!(inspect.contains("Next handle: 3"));

        let verify = run(&workspace, Commands::Verify).unwrap();
        assert!(verify.starts_with("Ledger verified: origin 0, tip 5"));
    });
}

#[test]
fn test_frames_and_get() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    with_isolated_env(&test_dir, || {
        seed_workspace(&workspace);

        let text = run(
            &workspace,
            Commands::Frames {
                from: Some(3),
                format: "text".to_string(),
            },
        )
        .unwrap();
        assert!(text.contains("strike"));
        assert!(!text.contains("spawn"));

        let json = run(
            &workspace,
            Commands::Frames {
                from: None,
                format: "json".to_string(),
            },
        )
        .unwrap();
        let rows: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(rows.len(), 6);

        let last = run(
            &workspace,
            Commands::Frames {
                from: Some(5),
                format: "json".to_string(),
            },
        )
        .unwrap();
        let rows: Vec<serde_json::Value> = serde_json::from_str(&last).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(matches!(
            run(
                &workspace,
                Commands::Frames {
                    from: Some(6),
                    format: "text".to_string(),
                },
            ),
            Err(LedgerError::FrameNotFound(_))
        ));

        let get = run(
            &workspace,
            Commands::Get {
                handle: 1,
                at: Some(1),
            },
        )
        .unwrap();
        assert!(get.contains("Kind: unit"));
        assert!(get.contains("Born: 1"));

        assert!(matches!(
            run(&workspace, Commands::Get { handle: 2, at: Some(1) }),
            Err(LedgerError::NotFound { .. })
        ));
    });
}

#[test]
fn test_compact_saves_boundary() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    with_isolated_env(&test_dir, || {
        seed_workspace(&workspace);

        let out = run(
            &workspace,
            Commands::Compact {
                through: 3,
                drop_kind: Vec::new(),
            },
        )
        .unwrap();
        assert!(out.contains("origin is now 3"));

        let inspect = run(&workspace, Commands::Inspect).unwrap();
        assert!(inspect.contains("Origin: 3"));
        assert!(matches!(
            run(&workspace, Commands::Get { handle: 1, at: Some(2) }),
            Err(LedgerError::Compacted { .. })
        ));
    });
}

#[test]
fn test_missing_ledger_reported() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    with_isolated_env(&test_dir, || {
        let err = run(&workspace, Commands::Inspect).unwrap_err();
        assert!(err.to_string().contains("No ledger saved"));
    });
}
