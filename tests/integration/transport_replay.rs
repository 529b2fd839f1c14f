//! Peers agree by replaying relayed inputs

use super::test_utils::{shield_reactor, spawn, strike, Combat};
use annal::config::LedgerSettings;
use annal::transport::{decode_input, encode_input, output_digest};
use annal::{FrameCause, Ledger, LedgerError, Pipeline, ReplayMode, Replayer};

fn peer(seed: u64) -> Pipeline<Combat> {
    Pipeline::new(Ledger::new().unwrap(), Combat)
        .with_settings(&LedgerSettings {
            max_reaction_depth: 8,
            seed,
        })
        .with_reactor(shield_reactor)
}

#[test]
fn test_relayed_inputs_produce_identical_outputs() {
    let local = peer(11);
    let remote = peer(11);

    let a = spawn(&local, 30, 0);
    let b = spawn(&local, 30, 0);
    for input in [strike(a, b), strike(b, a), strike(a, b)] {
        let local_report = local.submit(input.clone()).unwrap();
        let wire = encode_input(&input).unwrap();
        // The remote peer spawns the same units on first contact.
        if remote.ledger().tip().position() == 0 {
            spawn(&remote, 30, 0);
            spawn(&remote, 30, 0);
        }
        let relayed = remote.submit_remote(&wire).unwrap();

        let local_final = local_report.final_frame.unwrap();
        let local_digest = match local.ledger().descriptor(local_final).unwrap() {
            FrameCause::Transaction(d) => output_digest(&d.output).unwrap(),
            FrameCause::Archive(_) => unreachable!(),
        };
        assert_eq!(relayed.output_digest, Some(local_digest));
        assert_eq!(relayed.report.frames, local_report.frames);
    }
    assert_eq!(
        local.ledger().digest(local.ledger().tip()).unwrap(),
        remote.ledger().digest(remote.ledger().tip()).unwrap()
    );
}

#[test]
fn test_peers_with_different_seeds_disagree() {
    let local = peer(1);
    let a = spawn(&local, 30, 0);
    let b = spawn(&local, 30, 0);
    for _ in 0..5 {
        local.submit(strike(a, b)).unwrap();
    }

    assert!(Replayer::new(&Combat, 1)
        .with_mode(ReplayMode::Recompute)
        .verify(local.ledger())
        .is_ok());
    assert!(matches!(
        Replayer::new(&Combat, 2)
            .with_mode(ReplayMode::Recompute)
            .verify(local.ledger()),
        Err(LedgerError::ReplayDivergence { .. })
    ));
}

#[test]
fn test_replaying_twice_is_identical() {
    let local = peer(5);
    let a = spawn(&local, 30, 0);
    let b = spawn(&local, 30, 0);
    for _ in 0..4 {
        local.submit(strike(a, b)).unwrap();
    }
    let first = Replayer::new(&Combat, 5).replay(local.ledger()).unwrap();
    let second = Replayer::new(&Combat, 5).replay(local.ledger()).unwrap();
    assert_eq!(
        first.digest(first.tip()).unwrap(),
        second.digest(second.tip()).unwrap()
    );
}

#[test]
fn test_wire_rejects_unknown_version() {
    let input = strike(annal::Handle::from_raw(1), annal::Handle::from_raw(2));
    let mut bytes = encode_input(&input).unwrap();
    bytes[..4].copy_from_slice(&2u32.to_le_bytes());
    assert!(decode_input(&bytes).is_err());
    let remote = peer(0);
    assert!(matches!(
        remote.submit_remote(&bytes),
        Err(LedgerError::StorageError(_))
    ));
}
