//! Status changes for persisted entities.
//!
//! Every status-changing request goes through the transition check before
//! anything is written; a rejected check leaves the stored record untouched
//! and returns the check's reason unmodified.

use std::sync::Arc;

use bunjin_core::{
    check_transition, PersonaSlug, Proposal, ProposalId, Segment, SegmentId,
    Session, SessionId, StatusMachine, SttStatus, Task, TaskId, TaskStatus, TransitionError,
    TreeId, UserId,
};
use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, info};

use crate::error::{RulesError, RulesResult};
use crate::evaluate::{assign_segment, Assignment, CompiledRuleTree};
use crate::store::{EntityStore, RuleStore};

/// Applies validated status changes and persona assignment to stored entities.
#[derive(Clone)]
pub struct LifecycleService {
    rules: Arc<dyn RuleStore>,
    entities: Arc<dyn EntityStore>,
}

impl LifecycleService {
    pub fn new(rules: Arc<dyn RuleStore>, entities: Arc<dyn EntityStore>) -> Self {
        Self { rules, entities }
    }

    /// PATCH a task's status. `to` is the raw status name from the request.
    pub fn update_task_status(
        &self,
        user_id: &UserId,
        task_id: &TaskId,
        to: &str,
        now: DateTime<Utc>,
    ) -> RulesResult<Task> {
        let mut task = self
            .entities
            .task(user_id, task_id)?
            .ok_or_else(|| RulesError::not_found("task", task_id))?;

        let target = checked_target::<TaskStatus>(task.status.as_str(), to)?;
        task.transition_to(target, now)?;
        self.entities.put_task(&task)?;

        info!(task = %task.id, status = %task.status, "Updated task status");
        Ok(task)
    }

    /// PATCH a segment's transcription status, storing `text` on `DONE`.
    ///
    /// `text` with any other target is rejected before anything is written.
    pub fn update_segment_stt(
        &self,
        user_id: &UserId,
        segment_id: &SegmentId,
        to: &str,
        text: Option<String>,
    ) -> RulesResult<Segment> {
        let mut segment = self
            .entities
            .segment(user_id, segment_id)?
            .ok_or_else(|| RulesError::not_found("segment", segment_id))?;

        let target = checked_target::<SttStatus>(segment.stt_status.as_str(), to)?;
        match (target, text) {
            (SttStatus::Done, Some(text)) => segment.complete(text)?,
            (_, Some(_)) => {
                return Err(TransitionError::new(format!(
                    "text is only accepted with {}",
                    SttStatus::Done.as_str()
                ))
                .into())
            }
            (target, None) => segment.transition_to(target)?,
        }
        self.entities.put_segment(&segment)?;

        info!(segment = %segment.id, status = %segment.stt_status, "Updated segment status");
        Ok(segment)
    }

    /// Start a session bound to the latest published version of `tree_id`.
    pub fn start_session(
        &self,
        user_id: &UserId,
        session_id: impl Into<SessionId>,
        tree_id: &TreeId,
        now: DateTime<Utc>,
    ) -> RulesResult<Session> {
        let latest = self.rules.latest_version(tree_id)?;
        let session = Session::start(session_id, user_id.clone(), latest.as_ref(), now);
        self.entities.put_session(&session)?;

        info!(
            session = %session.id,
            rules = session
                .rule_version
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string()),
            "Started session"
        );
        Ok(session)
    }

    pub fn stop_session(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> RulesResult<Session> {
        let mut session = self
            .entities
            .session(user_id, session_id)?
            .ok_or_else(|| RulesError::not_found("session", session_id))?;

        session.stop(now)?;
        self.entities.put_session(&session)?;
        Ok(session)
    }

    /// Confirm a proposal; `TASK` proposals also create a task.
    ///
    /// The confirmed proposal is written before the task. If the second
    /// write fails the proposal stays confirmed without its task, and a
    /// retry is rejected instead of creating a second task.
    pub fn confirm_proposal(
        &self,
        user_id: &UserId,
        proposal_id: &ProposalId,
        new_task_id: impl Into<TaskId>,
        now: DateTime<Utc>,
    ) -> RulesResult<(Proposal, Option<Task>)> {
        let mut proposal = self.load_proposal(user_id, proposal_id)?;
        let task = proposal.confirm(new_task_id, now)?;
        self.entities.put_proposal(&proposal)?;
        if let Some(task) = &task {
            self.entities.put_task(task)?;
        }

        info!(
            proposal = %proposal.id,
            created_task = task.as_ref().map(|t| t.id.as_str()).unwrap_or("-"),
            "Confirmed proposal"
        );
        Ok((proposal, task))
    }

    pub fn reject_proposal(
        &self,
        user_id: &UserId,
        proposal_id: &ProposalId,
        now: DateTime<Utc>,
    ) -> RulesResult<Proposal> {
        let mut proposal = self.load_proposal(user_id, proposal_id)?;
        proposal.reject(now)?;
        self.entities.put_proposal(&proposal)?;
        Ok(proposal)
    }

    /// Assign a persona to a segment using the rules frozen on its session.
    ///
    /// Sessions started before any publish have no rules; the segment is
    /// left unassigned and `None` is returned.
    pub fn assign_segment_persona(
        &self,
        user_id: &UserId,
        segment_id: &SegmentId,
        offset: FixedOffset,
    ) -> RulesResult<Option<Assignment>> {
        let mut segment = self
            .entities
            .segment(user_id, segment_id)?
            .ok_or_else(|| RulesError::not_found("segment", segment_id))?;
        let session = self
            .entities
            .session(user_id, &segment.session_id)?
            .ok_or_else(|| RulesError::not_found("session", &segment.session_id))?;

        let Some(version_ref) = session.rule_version else {
            debug!(segment = %segment.id, "Session has no published rules");
            return Ok(None);
        };
        let published = self
            .rules
            .get_version(&version_ref.tree_id, version_ref.version)?
            .ok_or_else(|| RulesError::not_found("version", &version_ref))?;

        let tree = CompiledRuleTree::compile(&published)?;
        let assignment = assign_segment(&tree, &mut segment, offset);
        self.entities.put_segment(&segment)?;

        Ok(Some(assignment))
    }

    /// Persona currently recorded on a segment.
    pub fn segment_persona(
        &self,
        user_id: &UserId,
        segment_id: &SegmentId,
    ) -> RulesResult<Option<PersonaSlug>> {
        Ok(self
            .entities
            .segment(user_id, segment_id)?
            .ok_or_else(|| RulesError::not_found("segment", segment_id))?
            .persona()
            .cloned())
    }

    fn load_proposal(&self, user_id: &UserId, id: &ProposalId) -> RulesResult<Proposal> {
        self.entities
            .proposal(user_id, id)?
            .ok_or_else(|| RulesError::not_found("proposal", id))
    }
}

impl std::fmt::Debug for LifecycleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleService").finish_non_exhaustive()
    }
}

/// Run the string-level check and return the parsed target.
fn checked_target<S: StatusMachine>(from: &str, to: &str) -> Result<S, TransitionError> {
    if let Err(err) = check_transition::<S>(from, to).into_result() {
        debug!(machine = S::MACHINE, from, to, reason = %err, "Rejected status change");
        return Err(err);
    }
    S::parse(to).ok_or_else(|| TransitionError::new(format!("unknown status {}", to)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, StoreResult};
    use crate::store::{InMemoryEntityStore, InMemoryRuleStore};

    fn service() -> (LifecycleService, Arc<InMemoryEntityStore>) {
        let entities = Arc::new(InMemoryEntityStore::new());
        let service = LifecycleService::new(Arc::new(InMemoryRuleStore::new()), entities.clone());
        (service, entities)
    }

    #[test]
    fn rejected_task_change_leaves_record_untouched() {
        let (service, entities) = service();
        let user = UserId::new("u1");
        let now = Utc::now();
        entities.put_task(&Task::new("t1", user.clone(), "draft", now)).unwrap();

        let err = service
            .update_task_status(&user, &TaskId::new("t1"), "DONE", now)
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot transition from TODO to DONE");

        let stored = entities.task(&user, &TaskId::new("t1")).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Todo);

        let err = service
            .update_task_status(&user, &TaskId::new("t1"), "doing", now)
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown status doing");
        let stored = entities.task(&user, &TaskId::new("t1")).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Todo);

        let updated = service
            .update_task_status(&user, &TaskId::new("t1"), "DOING", now)
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Doing);
    }

    #[test]
    fn other_users_records_are_not_found() {
        let (service, entities) = service();
        let now = Utc::now();
        entities
            .put_task(&Task::new("t1", UserId::new("alice"), "x", now))
            .unwrap();

        let err = service
            .update_task_status(&UserId::new("bob"), &TaskId::new("t1"), "DOING", now)
            .unwrap_err();
        assert!(matches!(err, RulesError::NotFound { kind: "task", .. }));
    }

    #[test]
    fn unknown_status_is_reported() {
        let (service, entities) = service();
        let user = UserId::new("u1");
        let now = Utc::now();
        entities.put_task(&Task::new("t1", user.clone(), "x", now)).unwrap();

        let err = service
            .update_task_status(&user, &TaskId::new("t1"), "LATER", now)
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown status LATER");
    }

    #[test]
    fn session_keeps_rules_bound_at_start() {
        use crate::publish::RulePublisher;
        use bunjin_core::{DraftTree, RuleNode, SttStatus};
        use chrono::TimeZone;

        let user = UserId::new("u1");
        let tree = TreeId::new("tree");
        let rules = Arc::new(InMemoryRuleStore::new().with_draft(DraftTree {
            tree_id: tree.clone(),
            user_id: user.clone(),
            nodes: vec![
                RuleNode::condition("root", None, "hour >= 0 && hour < 24"),
                RuleNode::persona("p", Some("root"), "work"),
            ],
        }));
        let entities = Arc::new(InMemoryEntityStore::new());
        let service = LifecycleService::new(rules.clone(), entities.clone());
        let publisher = RulePublisher::new(rules.clone());
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

        publisher.publish_at(&user, now).unwrap();
        let session = service.start_session(&user, "s1", &tree, now).unwrap();

        // Republish with a different persona; the running session must not see it.
        rules
            .save_draft(&DraftTree {
                tree_id: tree.clone(),
                user_id: user.clone(),
                nodes: vec![
                    RuleNode::condition("root", None, "hour >= 0 && hour < 24"),
                    RuleNode::persona("p", Some("root"), "rest"),
                ],
            })
            .unwrap();
        assert_eq!(publisher.publish_at(&user, now).unwrap().version, 2);

        let segment = Segment::new("seg1", session.id.clone(), user.clone(), now);
        entities.put_segment(&segment).unwrap();
        service
            .update_segment_stt(&user, &segment.id, "PROCESSING", None)
            .unwrap();
        let done = service
            .update_segment_stt(&user, &segment.id, "DONE", Some("hello".to_string()))
            .unwrap();
        assert_eq!(done.stt_status, SttStatus::Done);
        assert_eq!(done.text.as_deref(), Some("hello"));

        let offset = FixedOffset::east_opt(0).unwrap();
        let assignment = service
            .assign_segment_persona(&user, &segment.id, offset)
            .unwrap()
            .unwrap();
        assert_eq!(assignment.version.version, 1);
        assert_eq!(assignment.persona.as_ref().map(|p| p.as_str()), Some("work"));
        assert_eq!(
            service
                .segment_persona(&user, &segment.id)
                .unwrap()
                .map(|p| p.to_string()),
            Some("work".to_string())
        );

        let stopped = service.stop_session(&user, &session.id, now).unwrap();
        assert!(stopped.stopped_at.is_some());
        assert!(service.stop_session(&user, &session.id, now).is_err());
    }

    #[test]
    fn session_without_published_rules_assigns_nothing() {
        let (service, entities) = service();
        let user = UserId::new("u1");
        let now = Utc::now();

        let session = service
            .start_session(&user, "s1", &TreeId::new("none"), now)
            .unwrap();
        assert!(session.rule_version.is_none());

        let segment = Segment::new("seg1", session.id.clone(), user.clone(), now);
        entities.put_segment(&segment).unwrap();
        let offset = FixedOffset::east_opt(0).unwrap();
        assert!(service
            .assign_segment_persona(&user, &segment.id, offset)
            .unwrap()
            .is_none());
    }

    #[test]
    fn confirming_task_proposal_creates_task_once() {
        use bunjin_core::{ProposalKind, ProposalStatus};

        let (service, entities) = service();
        let user = UserId::new("u1");
        let now = Utc::now();
        entities
            .put_proposal(
                &Proposal::new("pr1", user.clone(), ProposalKind::Task, "call bank")
                    .with_persona("work"),
            )
            .unwrap();

        let (proposal, task) = service
            .confirm_proposal(&user, &ProposalId::new("pr1"), "t9", now)
            .unwrap();
        assert_eq!(proposal.status, ProposalStatus::Confirmed);
        let task = task.unwrap();
        assert_eq!(task.title, "call bank");
        assert!(entities.task(&user, &TaskId::new("t9")).unwrap().is_some());

        let err = service
            .reject_proposal(&user, &ProposalId::new("pr1"), now)
            .unwrap_err();
        assert!(matches!(err, RulesError::Transition(_)));
    }

    #[test]
    fn segment_text_requires_done() {
        let (service, entities) = service();
        let user = UserId::new("u1");
        let segment = Segment::new("seg1", SessionId::new("s1"), user.clone(), Utc::now());
        entities.put_segment(&segment).unwrap();

        let err = service
            .update_segment_stt(&user, &segment.id, "PROCESSING", Some("early".to_string()))
            .unwrap_err();
        assert_eq!(err.to_string(), "text is only accepted with DONE");

        let stored = entities.segment(&user, &segment.id).unwrap().unwrap();
        assert_eq!(stored.stt_status, SttStatus::Pending);
        assert!(stored.text.is_none());
    }

    /// Entity store whose task writes always fail.
    struct TaskWritesFail(InMemoryEntityStore);

    impl EntityStore for TaskWritesFail {
        fn task(&self, user_id: &UserId, id: &TaskId) -> StoreResult<Option<Task>> {
            self.0.task(user_id, id)
        }
        fn put_task(&self, _task: &Task) -> StoreResult<()> {
            Err(StoreError::Unavailable {
                message: "task table offline".to_string(),
            })
        }
        fn segment(&self, user_id: &UserId, id: &SegmentId) -> StoreResult<Option<Segment>> {
            self.0.segment(user_id, id)
        }
        fn put_segment(&self, segment: &Segment) -> StoreResult<()> {
            self.0.put_segment(segment)
        }
        fn session(&self, user_id: &UserId, id: &SessionId) -> StoreResult<Option<Session>> {
            self.0.session(user_id, id)
        }
        fn put_session(&self, session: &Session) -> StoreResult<()> {
            self.0.put_session(session)
        }
        fn proposal(&self, user_id: &UserId, id: &ProposalId) -> StoreResult<Option<Proposal>> {
            self.0.proposal(user_id, id)
        }
        fn put_proposal(&self, proposal: &Proposal) -> StoreResult<()> {
            self.0.put_proposal(proposal)
        }
    }

    #[test]
    fn failed_task_write_cannot_be_retried_into_a_duplicate() {
        use bunjin_core::{ProposalKind, ProposalStatus};

        let entities = Arc::new(TaskWritesFail(InMemoryEntityStore::new()));
        let service = LifecycleService::new(Arc::new(InMemoryRuleStore::new()), entities.clone());
        let user = UserId::new("u1");
        let now = Utc::now();
        entities
            .put_proposal(&Proposal::new("pr1", user.clone(), ProposalKind::Task, "call bank"))
            .unwrap();

        let err = service
            .confirm_proposal(&user, &ProposalId::new("pr1"), "t9", now)
            .unwrap_err();
        assert!(err.is_transient());

        let stored = entities.proposal(&user, &ProposalId::new("pr1")).unwrap().unwrap();
        assert_eq!(stored.status, ProposalStatus::Confirmed);
        let retry = service
            .confirm_proposal(&user, &ProposalId::new("pr1"), "t10", now)
            .unwrap_err();
        assert!(matches!(retry, RulesError::Transition(_)));
    }
}
