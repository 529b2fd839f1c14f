//! Shared test utilities for integration tests
//!
//! A small combat rule set exercised by most suites, plus environment
//! isolation for tests that touch HOME and XDG variables.

use annal::frame::FrameBuilder;
use annal::object::encode_payload;
use annal::transaction::OutcomeRecorder;
use annal::{
    DescriptorInput, Handle, Ledger, LedgerError, ParamValue, Pipeline, TransactionDescriptor,
    View,
};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tempfile::TempDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub hp: i64,
    pub armor: i64,
}

/// spawn / strike / shield / heal / kill
///
/// `strike` draws 1..=6 damage from the outcome stream, reduced by armor; a
/// unit at zero hp is destroyed. Only `strike` is interruptible.
pub struct Combat;

fn actor(input: &DescriptorInput) -> Result<Handle, String> {
    input
        .actor
        .ok_or_else(|| format!("'{}' needs an actor", input.action))
}

fn target(input: &DescriptorInput) -> Result<Handle, String> {
    input
        .targets
        .first()
        .copied()
        .ok_or_else(|| format!("'{}' needs a target", input.action))
}

fn alive(view: &View, handle: Handle) -> Result<(), String> {
    if view.exists(handle) {
        Ok(())
    } else {
        Err(format!("{} is gone at {}", handle, view.at()))
    }
}

impl annal::RuleSet for Combat {
    fn validate(&self, view: &View, input: &DescriptorInput) -> Result<(), String> {
        match input.action.as_str() {
            "spawn" => Ok(()),
            "strike" => {
                alive(view, actor(input)?)?;
                alive(view, target(input)?)
            }
            "shield" => alive(view, actor(input)?),
            "heal" | "kill" => alive(view, target(input)?),
            other => Err(format!("unknown action '{}'", other)),
        }
    }

    fn apply(
        &self,
        builder: &mut FrameBuilder,
        input: &DescriptorInput,
        outcomes: &mut OutcomeRecorder,
    ) -> Result<(), LedgerError> {
        match input.action.as_str() {
            "spawn" => {
                let hp = input.param("hp").and_then(ParamValue::as_int).unwrap_or(10);
                let armor = input.param("armor").and_then(ParamValue::as_int).unwrap_or(0);
                builder.create("unit".into(), encode_payload(&Unit { hp, armor })?)?;
            }
            "strike" => {
                let target = target(input).map_err(LedgerError::Rule)?;
                let damage = outcomes.roll("damage", 1, 6)?;
                let mut unit: Unit = builder.read(target)?.decode()?;
                unit.hp -= (damage - unit.armor).max(0);
                if unit.hp <= 0 {
                    builder.destroy(target)?;
                } else {
                    builder.stage(target)?.encode(&unit)?;
                }
            }
            "shield" => {
                let actor = actor(input).map_err(LedgerError::Rule)?;
                builder.stage(actor)?.update(|u: &mut Unit| u.armor += 2)?;
            }
            "heal" => {
                let target = target(input).map_err(LedgerError::Rule)?;
                let amount = input.param("amount").and_then(ParamValue::as_int).unwrap_or(1);
                builder.stage(target)?.update(|u: &mut Unit| u.hp += amount)?;
            }
            "kill" => {
                builder.destroy(target(input).map_err(LedgerError::Rule)?)?;
            }
            other => return Err(LedgerError::Rule(format!("unknown action '{}'", other))),
        }
        Ok(())
    }

    fn interruptible(&self, input: &DescriptorInput) -> bool {
        input.action == "strike"
    }
}

/// Struck units without armor raise a shield before the blow lands.
pub fn shield_reactor(view: &View, descriptor: &TransactionDescriptor) -> Vec<DescriptorInput> {
    let Some(target) = descriptor.input.targets.first().copied() else {
        return Vec::new();
    };
    match view.decode::<Unit>(target) {
        Ok(unit) if unit.armor == 0 => vec![DescriptorInput::new("shield").with_actor(target)],
        _ => Vec::new(),
    }
}

/// Struck units strike back by killing the attacker outright.
pub fn retaliation_reactor(
    view: &View,
    descriptor: &TransactionDescriptor,
) -> Vec<DescriptorInput> {
    match (descriptor.input.actor, descriptor.input.targets.first()) {
        (Some(attacker), Some(defender)) if view.exists(*defender) => {
            vec![DescriptorInput::new("kill").with_target(attacker)]
        }
        _ => Vec::new(),
    }
}

pub fn spawn(pipeline: &Pipeline<Combat>, hp: i64, armor: i64) -> Handle {
    let report = pipeline
        .submit(
            DescriptorInput::new("spawn")
                .with_param("hp", ParamValue::Int(hp))
                .with_param("armor", ParamValue::Int(armor)),
        )
        .unwrap();
    let frame = pipeline
        .ledger()
        .frame(report.final_frame.unwrap())
        .unwrap();
    *frame.objects().keys().next().unwrap()
}

pub fn strike(attacker: Handle, defender: Handle) -> DescriptorInput {
    DescriptorInput::new("strike")
        .with_actor(attacker)
        .with_target(defender)
}

pub fn pipeline() -> Pipeline<Combat> {
    Pipeline::new(Ledger::new().unwrap(), Combat)
}

pub fn unit_at(ledger: &Ledger, handle: Handle, at: annal::FrameId) -> Unit {
    ledger.get(handle, at).unwrap().decode().unwrap()
}

/// Global mutex to serialize HOME / XDG environment access across tests.
static XDG_ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Environment variable state to restore after a test
struct EnvState {
    vars: Vec<(&'static str, Option<String>)>,
}

const ISOLATED_VARS: [&str; 7] = [
    "HOME",
    "XDG_CONFIG_HOME",
    "ANNAL_LEDGER__SEED",
    "ANNAL_LEDGER__MAX_REACTION_DEPTH",
    "ANNAL_STORAGE__BACKEND",
    "ANNAL_STORAGE__PATH",
    "ANNAL_COMPACTION__ENABLED",
];

impl EnvState {
    fn capture() -> Self {
        Self {
            vars: ISOLATED_VARS
                .iter()
                .map(|name| (*name, std::env::var(name).ok()))
                .collect(),
        }
    }

    fn restore(self) {
        for (name, value) in self.vars {
            match value {
                Some(v) => std::env::set_var(name, v),
                None => std::env::remove_var(name),
            }
        }
    }
}

/// Run `f` with HOME and XDG_CONFIG_HOME inside `test_dir` and every
/// `ANNAL_` override cleared; the previous environment is restored after.
pub fn with_isolated_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = XDG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = EnvState::capture();

    let home = test_dir.path().join("home");
    std::fs::create_dir_all(&home).unwrap();
    std::env::set_var("HOME", &home);
    std::env::set_var("XDG_CONFIG_HOME", test_dir.path().join("config"));
    for name in &ISOLATED_VARS[2..] {
        std::env::remove_var(name);
    }

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));
    env_state.restore();
    match result {
        Ok(value) => value,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
