//! Transition command implementation.

use anyhow::Result;
use bunjin_core::{
    can_transition_proposal, can_transition_session, can_transition_stt, can_transition_task,
    ProposalStatus, SessionStatus, StatusMachine, SttStatus, TaskStatus,
};
use clap::ValueEnum;

/// Status machines the CLI can check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Machine {
    Task,
    Stt,
    Session,
    Proposal,
}

/// Check `from -> to` and fail with the rejection reason.
pub fn execute(machine: Machine, from: &str, to: &str) -> Result<()> {
    let (name, check) = match machine {
        Machine::Task => (TaskStatus::MACHINE, can_transition_task(from, to)),
        Machine::Stt => (SttStatus::MACHINE, can_transition_stt(from, to)),
        Machine::Session => (SessionStatus::MACHINE, can_transition_session(from, to)),
        Machine::Proposal => (ProposalStatus::MACHINE, can_transition_proposal(from, to)),
    };

    if check.valid {
        println!("✅ {}: {} -> {} is allowed", name, from, to);
        return Ok(());
    }
    anyhow::bail!("{}: {}", name, check.reason.unwrap_or_default())
}
