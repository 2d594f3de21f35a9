use sqlx::{Postgres, QueryBuilder};

/// Row-level predicate restricting which rows of an entity an actor observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Everything,
    Nothing,
    /// Clinics whose `clinic_admin` is this user.
    ManagedBy(i64),
    /// Rows belonging to this clinic.
    Clinic(i64),
    /// Rows whose responsible therapist has this email.
    TherapistEmail(String),
    /// Rows whose owning client has this parent email.
    ParentEmail(String),
    /// User accounts whose email is a therapist or parent email of this clinic.
    ClinicMembers(i64),
    /// A single user account.
    Account(i64),
}

/// Ownership facts of one row, used to test a single instance against a scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ownership {
    pub id: Option<i64>,
    pub clinic_id: Option<i64>,
    pub clinic_admin_id: Option<i64>,
    pub therapist_email: Option<String>,
    pub parent_email: Option<String>,
    pub email: Option<String>,
    /// Clinics listing this account's email on a therapist or client profile.
    pub member_of: Vec<i64>,
}

/// SQL expressions an entity's list query exposes for each ownership fact.
/// `None` means the entity has no such fact and any scope on it renders `FALSE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeColumns {
    pub id: Option<&'static str>,
    pub clinic: Option<&'static str>,
    pub clinic_admin: Option<&'static str>,
    pub therapist_email: Option<&'static str>,
    pub parent_email: Option<&'static str>,
    pub email: Option<&'static str>,
}

fn same_email(row: Option<&str>, wanted: &str) -> bool {
    match row {
        Some(email) => !wanted.is_empty() && email.trim().eq_ignore_ascii_case(wanted.trim()),
        None => false,
    }
}

impl Scope {
    pub fn is_nothing(&self) -> bool {
        matches!(self, Scope::Nothing)
    }

    pub fn admits(&self, row: &Ownership) -> bool {
        match self {
            Scope::Everything => true,
            Scope::Nothing => false,
            Scope::ManagedBy(user_id) => row.clinic_admin_id == Some(*user_id),
            Scope::Clinic(clinic_id) => row.clinic_id == Some(*clinic_id),
            Scope::TherapistEmail(email) => same_email(row.therapist_email.as_deref(), email),
            Scope::ParentEmail(email) => same_email(row.parent_email.as_deref(), email),
            Scope::ClinicMembers(clinic_id) => row.member_of.contains(clinic_id),
            Scope::Account(user_id) => row.id == Some(*user_id),
        }
    }

    /// Append this predicate as a parenthesised boolean SQL expression.
    pub fn push_filter(&self, qb: &mut QueryBuilder<'_, Postgres>, cols: &ScopeColumns) {
        match self {
            Scope::Everything => {
                qb.push("TRUE");
            }
            Scope::Nothing => {
                qb.push("FALSE");
            }
            Scope::ManagedBy(user_id) => push_eq(qb, cols.clinic_admin, *user_id),
            Scope::Clinic(clinic_id) => push_eq(qb, cols.clinic, *clinic_id),
            Scope::Account(user_id) => push_eq(qb, cols.id, *user_id),
            Scope::TherapistEmail(email) => push_email_eq(qb, cols.therapist_email, email),
            Scope::ParentEmail(email) => push_email_eq(qb, cols.parent_email, email),
            Scope::ClinicMembers(clinic_id) => match cols.email {
                Some(col) => {
                    qb.push(format!("(LOWER({col}) IN (SELECT LOWER(email) FROM therapist_profiles WHERE email IS NOT NULL AND clinic_id = "));
                    qb.push_bind(*clinic_id);
                    qb.push(" UNION SELECT LOWER(parent_email) FROM parent_profiles WHERE parent_email IS NOT NULL AND clinic_id = ");
                    qb.push_bind(*clinic_id);
                    qb.push("))");
                }
                None => {
                    qb.push("FALSE");
                }
            },
        }
    }
}

fn push_eq(qb: &mut QueryBuilder<'_, Postgres>, col: Option<&'static str>, value: i64) {
    match col {
        Some(col) => {
            qb.push(format!("({col} = "));
            qb.push_bind(value);
            qb.push(")");
        }
        None => {
            qb.push("FALSE");
        }
    }
}

fn push_email_eq(qb: &mut QueryBuilder<'_, Postgres>, col: Option<&'static str>, email: &str) {
    match col {
        Some(col) if !email.trim().is_empty() => {
            qb.push(format!("(LOWER({col}) = "));
            qb.push_bind(email.trim().to_lowercase());
            qb.push(")");
        }
        _ => {
            qb.push("FALSE");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_COLS: ScopeColumns = ScopeColumns {
        id: Some("p.id"),
        clinic: Some("p.clinic_id"),
        clinic_admin: None,
        therapist_email: Some("th.email"),
        parent_email: Some("p.parent_email"),
        email: None,
    };

    fn render(scope: &Scope, cols: &ScopeColumns) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM t WHERE ");
        scope.push_filter(&mut qb, cols);
        qb.sql().to_string()
    }

    #[test]
    fn email_scopes_match_case_insensitively() {
        let row = Ownership {
            parent_email: Some("Ann@Example.com".into()),
            ..Ownership::default()
        };
        assert!(Scope::ParentEmail("ann@example.com".into()).admits(&row));
        assert!(!Scope::ParentEmail("bob@example.com".into()).admits(&row));
        assert!(!Scope::TherapistEmail("ann@example.com".into()).admits(&row));
    }

    #[test]
    fn empty_email_never_matches() {
        let row = Ownership {
            therapist_email: Some(String::new()),
            ..Ownership::default()
        };
        assert!(!Scope::TherapistEmail(String::new()).admits(&row));
    }

    #[test]
    fn nothing_admits_nothing() {
        let row = Ownership {
            id: Some(1),
            clinic_id: Some(1),
            ..Ownership::default()
        };
        assert!(!Scope::Nothing.admits(&row));
        assert!(Scope::Everything.admits(&row));
    }

    #[test]
    fn clinic_scope_renders_bound_parameter() {
        let sql = render(&Scope::Clinic(7), &CLIENT_COLS);
        assert_eq!(sql, "SELECT * FROM t WHERE (p.clinic_id = $1)");
    }

    #[test]
    fn parent_scope_renders_lowercased_comparison() {
        let sql = render(&Scope::ParentEmail("A@x.io".into()), &CLIENT_COLS);
        assert_eq!(sql, "SELECT * FROM t WHERE (LOWER(p.parent_email) = $1)");
    }

    #[test]
    fn scope_on_missing_column_renders_false() {
        let sql = render(&Scope::ManagedBy(3), &CLIENT_COLS);
        assert!(sql.ends_with("FALSE"));
        let sql = render(&Scope::ClinicMembers(3), &CLIENT_COLS);
        assert!(sql.ends_with("FALSE"));
    }

    #[test]
    fn clinic_members_binds_clinic_twice() {
        let cols = ScopeColumns {
            id: Some("u.id"),
            email: Some("u.email"),
            ..ScopeColumns::default()
        };
        let sql = render(&Scope::ClinicMembers(4), &cols);
        assert!(sql.contains("LOWER(u.email) IN"));
        assert!(sql.contains("clinic_id = $1"));
        assert!(sql.contains("clinic_id = $2"));
    }
}
