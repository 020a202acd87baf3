//! Status machines for tasks, transcription segments, sessions and proposals.
//!
//! Each machine is a closed status enum implementing [`StatusMachine`], which
//! lists the legal targets for every status. Checks are pure and total: they
//! never panic, and unknown names are reported through
//! [`TransitionCheck::reason`] rather than as errors.
//!
//! ```text
//! Task      TODO -> DOING | ARCHIVED
//!           DOING -> TODO | DONE | ARCHIVED
//!           DONE -> TODO | ARCHIVED
//!           ARCHIVED (terminal)
//!
//! Stt       PENDING -> PROCESSING | FAILED
//!           PROCESSING -> DONE | FAILED | PENDING
//!           FAILED -> PENDING | PROCESSING
//!           DONE (terminal)
//!
//! Session   ACTIVE -> STOPPED
//! Proposal  PENDING -> CONFIRMED | REJECTED
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;
use crate::{
    PersonaSlug, ProposalId, PublishedVersion, SegmentId, SessionId, TaskId, UserId, VersionRef,
};

// =============================================================================
// Transition Checks
// =============================================================================

/// Outcome of a transition check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionCheck {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TransitionCheck {
    pub fn allowed() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }

    /// Convert into a `Result` for callers that reject the enclosing request.
    pub fn into_result(self) -> Result<(), TransitionError> {
        if self.valid {
            Ok(())
        } else {
            Err(TransitionError::new(self.reason.unwrap_or_default()))
        }
    }
}

/// A finite status machine over a closed set of statuses.
pub trait StatusMachine: Copy + Eq + fmt::Debug + 'static {
    /// Machine name used in logs and the CLI.
    const MACHINE: &'static str;

    /// Every status, in declaration order.
    const ALL: &'static [Self];

    /// Wire name, e.g. `TODO`.
    fn as_str(self) -> &'static str;

    /// Statuses reachable in one step.
    fn targets(self) -> &'static [Self];

    fn is_terminal(self) -> bool {
        self.targets().is_empty()
    }

    /// Parse a wire name. Names are matched exactly: `todo` or ` TODO` is
    /// an unknown status.
    fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == name)
    }

    /// Check a typed transition.
    fn can_transition_to(self, to: Self) -> TransitionCheck {
        if self == to {
            return TransitionCheck::rejected(format!("already in status {}", self.as_str()));
        }
        if self.is_terminal() {
            return TransitionCheck::rejected(format!(
                "cannot transition from terminal status {}",
                self.as_str()
            ));
        }
        if self.targets().contains(&to) {
            TransitionCheck::allowed()
        } else {
            TransitionCheck::rejected(format!(
                "cannot transition from {} to {}",
                self.as_str(),
                to.as_str()
            ))
        }
    }
}

/// Check a transition given raw status names.
pub fn check_transition<S: StatusMachine>(from: &str, to: &str) -> TransitionCheck {
    let Some(from_status) = S::parse(from) else {
        return TransitionCheck::rejected(format!("unknown status {}", from));
    };
    let Some(to_status) = S::parse(to) else {
        return TransitionCheck::rejected(format!("unknown status {}", to));
    };
    from_status.can_transition_to(to_status)
}

pub fn can_transition_task(from: &str, to: &str) -> TransitionCheck {
    check_transition::<TaskStatus>(from, to)
}

pub fn can_transition_stt(from: &str, to: &str) -> TransitionCheck {
    check_transition::<SttStatus>(from, to)
}

pub fn can_transition_session(from: &str, to: &str) -> TransitionCheck {
    check_transition::<SessionStatus>(from, to)
}

pub fn can_transition_proposal(from: &str, to: &str) -> TransitionCheck {
    check_transition::<ProposalStatus>(from, to)
}

// =============================================================================
// Status Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    Doing,
    Done,
    Archived,
}

impl StatusMachine for TaskStatus {
    const MACHINE: &'static str = "task";
    const ALL: &'static [Self] = &[Self::Todo, Self::Doing, Self::Done, Self::Archived];

    fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "TODO",
            TaskStatus::Doing => "DOING",
            TaskStatus::Done => "DONE",
            TaskStatus::Archived => "ARCHIVED",
        }
    }

    fn targets(self) -> &'static [Self] {
        match self {
            TaskStatus::Todo => &[TaskStatus::Doing, TaskStatus::Archived],
            TaskStatus::Doing => &[TaskStatus::Todo, TaskStatus::Done, TaskStatus::Archived],
            TaskStatus::Done => &[TaskStatus::Todo, TaskStatus::Archived],
            TaskStatus::Archived => &[],
        }
    }
}

/// Transcription (speech-to-text) status of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SttStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl StatusMachine for SttStatus {
    const MACHINE: &'static str = "stt";
    const ALL: &'static [Self] = &[Self::Pending, Self::Processing, Self::Done, Self::Failed];

    fn as_str(self) -> &'static str {
        match self {
            SttStatus::Pending => "PENDING",
            SttStatus::Processing => "PROCESSING",
            SttStatus::Done => "DONE",
            SttStatus::Failed => "FAILED",
        }
    }

    fn targets(self) -> &'static [Self] {
        match self {
            SttStatus::Pending => &[SttStatus::Processing, SttStatus::Failed],
            SttStatus::Processing => &[SttStatus::Done, SttStatus::Failed, SttStatus::Pending],
            SttStatus::Failed => &[SttStatus::Pending, SttStatus::Processing],
            SttStatus::Done => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Stopped,
}

impl StatusMachine for SessionStatus {
    const MACHINE: &'static str = "session";
    const ALL: &'static [Self] = &[Self::Active, Self::Stopped];

    fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Stopped => "STOPPED",
        }
    }

    fn targets(self) -> &'static [Self] {
        match self {
            SessionStatus::Active => &[SessionStatus::Stopped],
            SessionStatus::Stopped => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl StatusMachine for ProposalStatus {
    const MACHINE: &'static str = "proposal";
    const ALL: &'static [Self] = &[Self::Pending, Self::Confirmed, Self::Rejected];

    fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Pending => "PENDING",
            ProposalStatus::Confirmed => "CONFIRMED",
            ProposalStatus::Rejected => "REJECTED",
        }
    }

    fn targets(self) -> &'static [Self] {
        match self {
            ProposalStatus::Pending => &[ProposalStatus::Confirmed, ProposalStatus::Rejected],
            ProposalStatus::Confirmed | ProposalStatus::Rejected => &[],
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(TaskStatus, SttStatus, SessionStatus, ProposalStatus);

// =============================================================================
// Entities
// =============================================================================

/// A user task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub user_id: UserId,
    pub title: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub persona: Option<PersonaSlug>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        id: impl Into<TaskId>,
        user_id: UserId,
        title: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id,
            title: title.into(),
            status: TaskStatus::Todo,
            persona: None,
            created_at: now,
            archived_at: None,
        }
    }

    pub fn with_persona(mut self, persona: Option<PersonaSlug>) -> Self {
        self.persona = persona;
        self
    }

    /// Move to `to`, stamping `archived_at` when entering `ARCHIVED`.
    pub fn transition_to(&mut self, to: TaskStatus, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.status.can_transition_to(to).into_result()?;
        self.status = to;
        if to == TaskStatus::Archived {
            self.archived_at = Some(now);
        }
        Ok(())
    }
}

/// One transcribed unit of recorded audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub stt_status: SttStatus,
    #[serde(default)]
    pub text: Option<String>,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    persona: Option<PersonaSlug>,
    #[serde(default)]
    assigned_by: Option<VersionRef>,
}

impl Segment {
    pub fn new(
        id: impl Into<SegmentId>,
        session_id: SessionId,
        user_id: UserId,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            session_id,
            user_id,
            stt_status: SttStatus::Pending,
            text: None,
            recorded_at,
            persona: None,
            assigned_by: None,
        }
    }

    pub fn transition_to(&mut self, to: SttStatus) -> Result<(), TransitionError> {
        self.stt_status.can_transition_to(to).into_result()?;
        self.stt_status = to;
        Ok(())
    }

    /// Finish transcription: move to `DONE` and store the text.
    pub fn complete(&mut self, text: impl Into<String>) -> Result<(), TransitionError> {
        self.transition_to(SttStatus::Done)?;
        self.text = Some(text.into());
        Ok(())
    }

    /// Persona written by the rule evaluator.
    pub fn persona(&self) -> Option<&PersonaSlug> {
        self.persona.as_ref()
    }

    /// Version of the rules that produced [`Segment::persona`].
    pub fn assigned_by(&self) -> Option<&VersionRef> {
        self.assigned_by.as_ref()
    }

    /// Record an evaluation result. Only the evaluator path calls this.
    pub fn record_assignment(&mut self, persona: Option<PersonaSlug>, version: VersionRef) {
        self.persona = persona;
        self.assigned_by = Some(version);
    }
}

/// A recording session, bound to the rules that were live when it started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub status: SessionStatus,
    #[serde(default)]
    pub rule_version: Option<VersionRef>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub stopped_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Start a session, freezing `latest` as its rule version.
    pub fn start(
        id: impl Into<SessionId>,
        user_id: UserId,
        latest: Option<&PublishedVersion>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id,
            status: SessionStatus::Active,
            rule_version: latest.map(PublishedVersion::reference),
            started_at: now,
            stopped_at: None,
        }
    }

    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.status
            .can_transition_to(SessionStatus::Stopped)
            .into_result()?;
        self.status = SessionStatus::Stopped;
        self.stopped_at = Some(now);
        Ok(())
    }
}

/// What a proposal suggests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalKind {
    /// Confirming creates a task.
    Task,
    /// Informational; confirming has no side effect.
    Note,
}

/// An AI-suggested action awaiting the user's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub user_id: UserId,
    pub kind: ProposalKind,
    pub title: String,
    #[serde(default)]
    pub persona: Option<PersonaSlug>,
    pub status: ProposalStatus,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
}

impl Proposal {
    pub fn new(
        id: impl Into<ProposalId>,
        user_id: UserId,
        kind: ProposalKind,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id,
            kind,
            title: title.into(),
            persona: None,
            status: ProposalStatus::Pending,
            decided_at: None,
        }
    }

    pub fn with_persona(mut self, persona: impl Into<PersonaSlug>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    /// Confirm the proposal. `TASK` proposals yield the task to create.
    pub fn confirm(
        &mut self,
        task_id: impl Into<TaskId>,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>, TransitionError> {
        self.decide(ProposalStatus::Confirmed, now)?;
        Ok(match self.kind {
            ProposalKind::Task => Some(
                Task::new(task_id, self.user_id.clone(), self.title.clone(), now)
                    .with_persona(self.persona.clone()),
            ),
            ProposalKind::Note => None,
        })
    }

    pub fn reject(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.decide(ProposalStatus::Rejected, now)
    }

    fn decide(&mut self, to: ProposalStatus, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.status.can_transition_to(to).into_result()?;
        self.status = to;
        self.decided_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TreeId;

    fn user() -> UserId {
        UserId::new("u1")
    }

    #[test]
    fn task_table_is_total() {
        let legal = [
            ("TODO", "DOING"),
            ("TODO", "ARCHIVED"),
            ("DOING", "TODO"),
            ("DOING", "DONE"),
            ("DOING", "ARCHIVED"),
            ("DONE", "TODO"),
            ("DONE", "ARCHIVED"),
        ];

        for from in TaskStatus::ALL {
            for to in TaskStatus::ALL {
                let check = can_transition_task(from.as_str(), to.as_str());
                let expected = legal.contains(&(from.as_str(), to.as_str()));
                assert_eq!(check.valid, expected, "{} -> {}", from, to);
                assert_eq!(check.reason.is_none(), expected);
            }
        }
    }

    #[test]
    fn task_rejections_carry_reasons() {
        let same = can_transition_task("TODO", "TODO");
        assert!(!same.valid);
        assert!(same.reason.unwrap().contains("already in status TODO"));

        let unknown = can_transition_task("UNKNOWN", "TODO");
        assert!(!unknown.valid);
        assert!(unknown.reason.unwrap().contains("unknown status UNKNOWN"));

        let unknown_target = can_transition_task("TODO", "LATER");
        assert_eq!(unknown_target.reason.as_deref(), Some("unknown status LATER"));

        let archived = can_transition_task("ARCHIVED", "TODO");
        assert!(!archived.valid);
        assert_eq!(
            archived.reason.as_deref(),
            Some("cannot transition from terminal status ARCHIVED")
        );

        let skip = can_transition_task("TODO", "DONE");
        assert_eq!(
            skip.reason.as_deref(),
            Some("cannot transition from TODO to DONE")
        );
    }

    #[test]
    fn status_names_match_exactly() {
        assert_eq!(TaskStatus::parse("DOING"), Some(TaskStatus::Doing));
        assert_eq!(TaskStatus::parse("doing"), None);
        assert_eq!(SttStatus::parse(" FAILED "), None);
        assert_eq!(SessionStatus::parse("paused"), None);

        let lower = can_transition_task("todo", "DOING");
        assert!(!lower.valid);
        assert_eq!(lower.reason.as_deref(), Some("unknown status todo"));
        let padded = can_transition_task("TODO", "DOING ");
        assert_eq!(padded.reason.as_deref(), Some("unknown status DOING "));
    }

    #[test]
    fn stt_done_is_terminal() {
        for to in SttStatus::ALL {
            assert!(!SttStatus::Done.can_transition_to(*to).valid);
        }
        assert!(can_transition_stt("PENDING", "PROCESSING").valid);
        assert!(can_transition_stt("FAILED", "PENDING").valid);
        assert!(!can_transition_stt("PENDING", "DONE").valid);
    }

    #[test]
    fn session_and_proposal_machines() {
        assert!(can_transition_session("ACTIVE", "STOPPED").valid);
        assert!(!can_transition_session("STOPPED", "ACTIVE").valid);

        assert!(can_transition_proposal("PENDING", "CONFIRMED").valid);
        assert!(can_transition_proposal("PENDING", "REJECTED").valid);
        assert!(!can_transition_proposal("CONFIRMED", "REJECTED").valid);
        assert!(!can_transition_proposal("REJECTED", "PENDING").valid);
    }

    #[test]
    fn task_archive_stamps_archived_at() {
        let now = Utc::now();
        let mut task = Task::new("t1", user(), "write report", now);

        task.transition_to(TaskStatus::Doing, now).unwrap();
        assert!(task.archived_at.is_none());

        task.transition_to(TaskStatus::Archived, now).unwrap();
        assert_eq!(task.archived_at, Some(now));

        let err = task.transition_to(TaskStatus::Todo, now).unwrap_err();
        assert_eq!(err.reason, "cannot transition from terminal status ARCHIVED");
        assert_eq!(task.status, TaskStatus::Archived);
    }

    #[test]
    fn segment_complete_requires_processing() {
        let now = Utc::now();
        let mut segment = Segment::new("s1", SessionId::new("sess"), user(), now);

        assert!(segment.complete("hello").is_err());
        assert!(segment.text.is_none());

        segment.transition_to(SttStatus::Processing).unwrap();
        segment.complete("hello").unwrap();
        assert_eq!(segment.stt_status, SttStatus::Done);
        assert!(segment.transition_to(SttStatus::Processing).is_err());
    }

    #[test]
    fn session_freezes_version_and_stops_once() {
        let now = Utc::now();
        let version = PublishedVersion {
            tree_id: TreeId::new("tree"),
            version: 2,
            snapshot: vec![],
            published_at: now,
        };
        let mut session = Session::start("sess", user(), Some(&version), now);

        assert_eq!(session.rule_version, Some(version.reference()));
        session.stop(now).unwrap();
        assert!(session.stop(now).is_err());
    }

    #[test]
    fn confirming_task_proposal_yields_task() {
        let now = Utc::now();
        let mut proposal =
            Proposal::new("p1", user(), ProposalKind::Task, "call dentist").with_persona("rest");

        let task = proposal.confirm("task-1", now).unwrap().unwrap();
        assert_eq!(task.title, "call dentist");
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.persona, Some(PersonaSlug::new("rest")));
        assert_eq!(proposal.status, ProposalStatus::Confirmed);

        assert!(proposal.reject(now).is_err());
    }

    #[test]
    fn confirming_note_proposal_has_no_side_effect() {
        let mut proposal = Proposal::new("p2", user(), ProposalKind::Note, "nice walk");
        assert!(proposal.confirm("unused", Utc::now()).unwrap().is_none());
    }
}
