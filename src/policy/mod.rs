//! Access policy: which rows each actor sees and which writes it may perform.
//!
//! Everything here is pure. Services ask for a [`Scope`] and splice it into
//! their SQL with [`Scope::push_filter`], or check a loaded row with
//! [`PolicyEngine::authorize`].

mod scope;

pub use scope::{Ownership, Scope, ScopeColumns};

use crate::{
    error::{AppError, AppResult},
    models::auth::{Actor, ActorRole},
    services::metrics,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Clinic,
    Therapist,
    Client,
    Child,
    SpeechArea,
    LongTermGoal,
    ShortTermGoal,
    Task,
    Assignment,
    User,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Clinic => "clinic",
            EntityKind::Therapist => "therapist",
            EntityKind::Client => "client",
            EntityKind::Child => "child",
            EntityKind::SpeechArea => "speech_area",
            EntityKind::LongTermGoal => "long_term_goal",
            EntityKind::ShortTermGoal => "short_term_goal",
            EntityKind::Task => "task",
            EntityKind::Assignment => "assignment",
            EntityKind::User => "user",
        }
    }

    pub fn is_taxonomy(&self) -> bool {
        matches!(
            self,
            EntityKind::SpeechArea
                | EntityKind::LongTermGoal
                | EntityKind::ShortTermGoal
                | EntityKind::Task
        )
    }

    /// Column expressions used by this entity's list query.
    ///
    /// Services must alias their tables accordingly: `c` clinics, `t` the
    /// therapist row being listed, `p` parent_profiles, `ch` children,
    /// `th` the responsible therapist, `a` assignments, `u` users.
    pub fn columns(&self) -> ScopeColumns {
        match self {
            EntityKind::Clinic => ScopeColumns {
                id: Some("c.id"),
                clinic: Some("c.id"),
                clinic_admin: Some("c.clinic_admin_id"),
                ..ScopeColumns::default()
            },
            EntityKind::Therapist => ScopeColumns {
                id: Some("t.id"),
                clinic: Some("t.clinic_id"),
                therapist_email: Some("t.email"),
                email: Some("t.email"),
                ..ScopeColumns::default()
            },
            EntityKind::Client => ScopeColumns {
                id: Some("p.id"),
                clinic: Some("p.clinic_id"),
                therapist_email: Some("th.email"),
                parent_email: Some("p.parent_email"),
                ..ScopeColumns::default()
            },
            EntityKind::Child => ScopeColumns {
                id: Some("ch.id"),
                clinic: Some("ch.clinic_id"),
                therapist_email: Some("th.email"),
                parent_email: Some("p.parent_email"),
                ..ScopeColumns::default()
            },
            EntityKind::Assignment => ScopeColumns {
                id: Some("a.id"),
                clinic: Some("ch.clinic_id"),
                therapist_email: Some("th.email"),
                parent_email: Some("p.parent_email"),
                ..ScopeColumns::default()
            },
            EntityKind::User => ScopeColumns {
                id: Some("u.id"),
                email: Some("u.email"),
                ..ScopeColumns::default()
            },
            EntityKind::SpeechArea
            | EntityKind::LongTermGoal
            | EntityKind::ShortTermGoal
            | EntityKind::Task => ScopeColumns::default(),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Read,
    Add,
    Change,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Read => "read",
            Operation::Add => "add",
            Operation::Change => "change",
            Operation::Delete => "delete",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Operation::Add | Operation::Change | Operation::Delete)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Outcome of resolving an operation without a concrete target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Reads are filtered, never refused.
    Rows(Scope),
    Decision(Decision),
}

pub struct PolicyEngine;

impl PolicyEngine {
    /// Rows of `kind` the actor may list.
    pub fn scope(actor: &Actor, kind: EntityKind) -> Scope {
        if actor.has_full_access() || kind.is_taxonomy() {
            return Scope::Everything;
        }

        let email = || Scope::TherapistEmail(actor.email.clone());
        let parent = || Scope::ParentEmail(actor.email.clone());

        match (kind, actor.role) {
            (EntityKind::Clinic, ActorRole::ClinicAdmin { .. }) => Scope::ManagedBy(actor.user_id),
            (EntityKind::Clinic, _) => Scope::Nothing,

            (EntityKind::Therapist, ActorRole::ClinicAdmin { clinic_id: Some(c) }) => Scope::Clinic(c),
            (EntityKind::Therapist, ActorRole::Therapist) => email(),
            (EntityKind::Therapist, _) => Scope::Nothing,

            (EntityKind::Client | EntityKind::Child, ActorRole::ClinicAdmin { clinic_id: Some(c) }) => {
                Scope::Clinic(c)
            }
            (EntityKind::Client | EntityKind::Child, ActorRole::Therapist) => email(),
            (EntityKind::Client | EntityKind::Child, ActorRole::Parent) => parent(),
            (EntityKind::Client | EntityKind::Child, _) => Scope::Nothing,

            (EntityKind::Assignment, ActorRole::Therapist) => email(),
            (EntityKind::Assignment, ActorRole::Parent) => parent(),
            (EntityKind::Assignment, _) => Scope::Nothing,

            (EntityKind::User, ActorRole::ClinicAdmin { clinic_id: Some(c) }) => Scope::ClinicMembers(c),
            (EntityKind::User, ActorRole::ClinicAdmin { clinic_id: None }) => Scope::Nothing,
            (EntityKind::User, _) => Scope::Account(actor.user_id),

            _ => Scope::Nothing,
        }
    }

    /// Rows of `kind` the actor may open or modify individually.
    ///
    /// Identical to the list scope except for user accounts, where anyone
    /// without full access only ever touches their own.
    pub fn instance_scope(actor: &Actor, kind: EntityKind) -> Scope {
        match kind {
            EntityKind::User if !actor.has_full_access() => Scope::Account(actor.user_id),
            _ => Self::scope(actor, kind),
        }
    }

    /// Model-level permission, independent of any row.
    pub fn may(actor: &Actor, kind: EntityKind, op: Operation) -> bool {
        if actor.has_full_access() || !op.is_write() {
            return true;
        }

        let role = actor.role;
        // A clinic admin whose clinic could not be resolved administers nothing.
        if role == (ActorRole::ClinicAdmin { clinic_id: None }) {
            return kind == EntityKind::User && op == Operation::Change;
        }
        let admin = matches!(role, ActorRole::ClinicAdmin { .. });
        let therapist = role == ActorRole::Therapist;
        let parent = role == ActorRole::Parent;

        match (kind, op) {
            (EntityKind::Clinic, Operation::Change) => admin,
            (EntityKind::Clinic, _) => false,

            (EntityKind::Therapist, Operation::Change) => admin || therapist,
            (EntityKind::Therapist, _) => admin,

            (EntityKind::Client, Operation::Change) => admin || parent,
            (EntityKind::Client, _) => admin,

            (EntityKind::Child, Operation::Delete) => admin,
            (EntityKind::Child, _) => admin || therapist,

            (EntityKind::Assignment, _) => therapist,

            (EntityKind::User, Operation::Change) => true,
            (EntityKind::User, _) => false,

            (_, Operation::Delete) => false,
            (_, _) => admin || therapist,
        }
    }

    pub fn resolve_scope(actor: &Actor, kind: EntityKind, op: Operation) -> Resolution {
        match op {
            Operation::List => Resolution::Rows(Self::scope(actor, kind)),
            Operation::Read => Resolution::Rows(Self::instance_scope(actor, kind)),
            _ if Self::may(actor, kind, op) => Resolution::Decision(Decision::Allow),
            _ => Resolution::Decision(Decision::Deny),
        }
    }

    /// Decide one operation. With a target, the row must also lie inside
    /// the actor's instance scope.
    pub fn decide(
        actor: &Actor,
        kind: EntityKind,
        op: Operation,
        target: Option<&Ownership>,
    ) -> Decision {
        if op.is_write() && !Self::may(actor, kind, op) {
            return Decision::Deny;
        }
        match target {
            Some(row) if !Self::instance_scope(actor, kind).admits(row) => Decision::Deny,
            _ => Decision::Allow,
        }
    }

    /// `decide` mapped onto service errors: a denied read hides the row,
    /// a denied write is refused.
    pub fn authorize(
        actor: &Actor,
        kind: EntityKind,
        op: Operation,
        target: Option<&Ownership>,
    ) -> AppResult<()> {
        match Self::decide(actor, kind, op, target) {
            Decision::Allow => Ok(()),
            Decision::Deny => {
                metrics::AUTHZ_DENIALS
                    .with_label_values(&[kind.as_str(), op.as_str()])
                    .inc();
                tracing::warn!(
                    user_id = actor.user_id,
                    role = actor.role.label(),
                    entity = kind.as_str(),
                    operation = op.as_str(),
                    "access denied"
                );
                if op.is_write() {
                    Err(AppError::forbidden(format!(
                        "You do not have permission to {} this {}",
                        op.as_str(),
                        kind.as_str().replace('_', " ")
                    )))
                } else {
                    Err(AppError::not_found(format!(
                        "{} not found",
                        capitalize(&kind.as_str().replace('_', " "))
                    )))
                }
            }
        }
    }

    /// Clinic a new row is pinned to.
    ///
    /// Only actors with full access choose; a clinic admin always writes into
    /// their own clinic whatever the request says.
    pub fn creation_clinic(actor: &Actor, requested: Option<i64>) -> AppResult<Option<i64>> {
        if actor.has_full_access() {
            return Ok(requested);
        }
        match actor.role {
            ActorRole::ClinicAdmin { clinic_id: Some(c) } => Ok(Some(c)),
            ActorRole::ClinicAdmin { clinic_id: None } => {
                Err(AppError::forbidden("No clinic is linked to this clinic admin"))
            }
            _ => Ok(requested),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: ActorRole) -> Actor {
        Actor {
            user_id: 10,
            email: "me@clinic.test".into(),
            is_superuser: false,
            role,
        }
    }

    fn superuser() -> Actor {
        Actor {
            is_superuser: true,
            ..actor(ActorRole::Unassigned)
        }
    }

    const ADMIN: ActorRole = ActorRole::ClinicAdmin { clinic_id: Some(3) };
    const ALL: [EntityKind; 10] = [
        EntityKind::Clinic,
        EntityKind::Therapist,
        EntityKind::Client,
        EntityKind::Child,
        EntityKind::SpeechArea,
        EntityKind::LongTermGoal,
        EntityKind::ShortTermGoal,
        EntityKind::Task,
        EntityKind::Assignment,
        EntityKind::User,
    ];

    #[test]
    fn full_access_sees_everything() {
        for a in [superuser(), actor(ActorRole::SuperAdmin)] {
            for kind in ALL {
                assert_eq!(PolicyEngine::scope(&a, kind), Scope::Everything, "{kind}");
                for op in [Operation::Add, Operation::Change, Operation::Delete] {
                    assert!(PolicyEngine::may(&a, kind, op), "{kind} {op:?}");
                }
            }
        }
    }

    #[test]
    fn clinic_admin_scopes() {
        let a = actor(ADMIN);
        assert_eq!(PolicyEngine::scope(&a, EntityKind::Clinic), Scope::ManagedBy(10));
        assert_eq!(PolicyEngine::scope(&a, EntityKind::Therapist), Scope::Clinic(3));
        assert_eq!(PolicyEngine::scope(&a, EntityKind::Client), Scope::Clinic(3));
        assert_eq!(PolicyEngine::scope(&a, EntityKind::Child), Scope::Clinic(3));
        assert_eq!(PolicyEngine::scope(&a, EntityKind::Assignment), Scope::Nothing);
        assert_eq!(PolicyEngine::scope(&a, EntityKind::User), Scope::ClinicMembers(3));
        assert_eq!(PolicyEngine::scope(&a, EntityKind::Task), Scope::Everything);
    }

    #[test]
    fn clinic_admin_without_clinic_degrades_to_nothing() {
        let a = actor(ActorRole::ClinicAdmin { clinic_id: None });
        for kind in [EntityKind::Therapist, EntityKind::Client, EntityKind::Child, EntityKind::User] {
            assert_eq!(PolicyEngine::scope(&a, kind), Scope::Nothing, "{kind}");
        }
        assert!(!PolicyEngine::may(&a, EntityKind::Client, Operation::Add));
        assert!(PolicyEngine::creation_clinic(&a, Some(1)).is_err());
    }

    #[test]
    fn therapist_scopes_follow_email() {
        let a = actor(ActorRole::Therapist);
        let mine = Scope::TherapistEmail("me@clinic.test".into());
        assert_eq!(PolicyEngine::scope(&a, EntityKind::Clinic), Scope::Nothing);
        assert_eq!(PolicyEngine::scope(&a, EntityKind::Therapist), mine);
        assert_eq!(PolicyEngine::scope(&a, EntityKind::Client), mine);
        assert_eq!(PolicyEngine::scope(&a, EntityKind::Child), mine);
        assert_eq!(PolicyEngine::scope(&a, EntityKind::Assignment), mine);
        assert_eq!(PolicyEngine::scope(&a, EntityKind::User), Scope::Account(10));
    }

    #[test]
    fn parent_scopes_follow_parent_email() {
        let a = actor(ActorRole::Parent);
        let mine = Scope::ParentEmail("me@clinic.test".into());
        assert_eq!(PolicyEngine::scope(&a, EntityKind::Therapist), Scope::Nothing);
        assert_eq!(PolicyEngine::scope(&a, EntityKind::Client), mine);
        assert_eq!(PolicyEngine::scope(&a, EntityKind::Child), mine);
        assert_eq!(PolicyEngine::scope(&a, EntityKind::Assignment), mine);
    }

    #[test]
    fn unassigned_sees_only_taxonomy_and_self() {
        let a = actor(ActorRole::Unassigned);
        for kind in ALL {
            let expected = if kind.is_taxonomy() {
                Scope::Everything
            } else if kind == EntityKind::User {
                Scope::Account(10)
            } else {
                Scope::Nothing
            };
            assert_eq!(PolicyEngine::scope(&a, kind), expected, "{kind}");
        }
        for kind in ALL {
            for op in [Operation::Add, Operation::Delete] {
                assert!(!PolicyEngine::may(&a, kind, op), "{kind} {op:?}");
            }
        }
    }

    #[test]
    fn write_matrix() {
        use EntityKind::*;
        use Operation::*;
        let admin = actor(ADMIN);
        let therapist = actor(ActorRole::Therapist);
        let parent = actor(ActorRole::Parent);

        let cases: &[(EntityKind, Operation, bool, bool, bool)] = &[
            // kind, op, admin, therapist, parent
            (Clinic, Add, false, false, false),
            (Clinic, Change, true, false, false),
            (Clinic, Delete, false, false, false),
            (Therapist, Add, true, false, false),
            (Therapist, Change, true, true, false),
            (Therapist, Delete, true, false, false),
            (Client, Add, true, false, false),
            (Client, Change, true, false, true),
            (Client, Delete, true, false, false),
            (Child, Add, true, true, false),
            (Child, Change, true, true, false),
            (Child, Delete, true, false, false),
            (Assignment, Add, false, true, false),
            (Assignment, Change, false, true, false),
            (Assignment, Delete, false, true, false),
            (Task, Add, true, true, false),
            (SpeechArea, Change, true, true, false),
            (LongTermGoal, Delete, false, false, false),
            (User, Add, false, false, false),
            (User, Change, true, true, true),
            (User, Delete, false, false, false),
        ];
        for &(kind, op, a, t, p) in cases {
            assert_eq!(PolicyEngine::may(&admin, kind, op), a, "admin {kind} {op:?}");
            assert_eq!(PolicyEngine::may(&therapist, kind, op), t, "therapist {kind} {op:?}");
            assert_eq!(PolicyEngine::may(&parent, kind, op), p, "parent {kind} {op:?}");
        }
    }

    #[test]
    fn resolve_scope_filters_reads_and_decides_writes() {
        let parent = actor(ActorRole::Parent);
        assert_eq!(
            PolicyEngine::resolve_scope(&parent, EntityKind::Clinic, Operation::List),
            Resolution::Rows(Scope::Nothing)
        );
        assert_eq!(
            PolicyEngine::resolve_scope(&parent, EntityKind::Client, Operation::Change),
            Resolution::Decision(Decision::Allow)
        );
        assert_eq!(
            PolicyEngine::resolve_scope(&parent, EntityKind::Client, Operation::Delete),
            Resolution::Decision(Decision::Deny)
        );
        let admin = actor(ADMIN);
        assert_eq!(
            PolicyEngine::resolve_scope(&admin, EntityKind::User, Operation::Read),
            Resolution::Rows(Scope::Account(10))
        );
    }

    #[test]
    fn write_outside_scope_is_denied() {
        let admin = actor(ADMIN);
        let other_clinic = Ownership {
            clinic_id: Some(4),
            ..Ownership::default()
        };
        let own_clinic = Ownership {
            clinic_id: Some(3),
            ..Ownership::default()
        };
        assert_eq!(
            PolicyEngine::decide(&admin, EntityKind::Client, Operation::Change, Some(&other_clinic)),
            Decision::Deny
        );
        assert_eq!(
            PolicyEngine::decide(&admin, EntityKind::Client, Operation::Change, Some(&own_clinic)),
            Decision::Allow
        );
    }

    #[test]
    fn denied_read_is_masked_as_not_found() {
        let therapist = actor(ActorRole::Therapist);
        let foreign = Ownership {
            therapist_email: Some("other@clinic.test".into()),
            ..Ownership::default()
        };
        let err = PolicyEngine::authorize(&therapist, EntityKind::Client, Operation::Read, Some(&foreign))
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = PolicyEngine::authorize(&therapist, EntityKind::Client, Operation::Delete, None).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn instance_scope_agrees_with_list_scope() {
        // Anything a list query returns must also be openable individually.
        let rows = [
            Ownership {
                id: Some(10),
                clinic_id: Some(3),
                clinic_admin_id: Some(10),
                therapist_email: Some("ME@clinic.test".into()),
                parent_email: Some("me@clinic.test".into()),
                email: Some("me@clinic.test".into()),
                member_of: vec![3],
            },
            Ownership {
                id: Some(11),
                clinic_id: Some(4),
                therapist_email: Some("x@y.z".into()),
                ..Ownership::default()
            },
        ];
        for role in [ADMIN, ActorRole::Therapist, ActorRole::Parent, ActorRole::Unassigned] {
            let a = actor(role);
            for kind in ALL {
                if kind == EntityKind::User {
                    continue;
                }
                for row in &rows {
                    assert_eq!(
                        PolicyEngine::scope(&a, kind).admits(row),
                        PolicyEngine::instance_scope(&a, kind).admits(row),
                    );
                }
            }
        }
    }

    #[test]
    fn clinic_admin_creations_are_pinned() {
        let admin = actor(ADMIN);
        assert_eq!(PolicyEngine::creation_clinic(&admin, Some(99)).unwrap(), Some(3));
        assert_eq!(PolicyEngine::creation_clinic(&admin, None).unwrap(), Some(3));
        assert_eq!(PolicyEngine::creation_clinic(&superuser(), Some(99)).unwrap(), Some(99));
    }
}
