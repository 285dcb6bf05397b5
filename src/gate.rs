use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use url::form_urlencoded;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Role;

/// Login page every unauthenticated caller is sent to.
pub const LOGIN_PATH: &str = "/auth";
/// Query parameter carrying the page to return to after login.
pub const CALLBACK_PARAM: &str = "callbackUrl";
/// Landing page for USER sessions.
pub const USER_HOME: &str = "/user";
/// Where a USER is bounced when it reaches into the admin area.
pub const ADMIN_DENIED_REDIRECT: &str = "/user?denied=1";

// Checked before any session inspection.
const PUBLIC_PREFIXES: &[&str] = &["/(home)", "/auth", "/verify", "/api/health"];
const USER_PREFIX: &str = "/user";
const ADMIN_PREFIX: &str = "/admin";

// Global mode only: assets are never gated.
const ASSET_PREFIXES: &[&str] = &["/static", "/assets", "/favicon.ico"];
const ASSET_EXTENSIONS: &[&str] = &[
    "css", "js", "map", "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "woff", "woff2",
];

/// Session
///
/// The already-verified identity capsule the gate reads. It is produced by
/// `auth::resolve_session`; the gate never creates or mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    /// `None` when the stored role is not one this service knows.
    pub role: Option<Role>,
    /// Token expiry. Absent for sessions resolved through the local dev bypass.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Action
///
/// The only two outcomes of a gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Allow,
    RedirectTo(String),
}

/// GateDecision
///
/// Wire form of an `Action`: `{ "allow": true }` or `{ "allow": false, "redirectTo": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct GateDecision {
    pub allow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

impl From<Action> for GateDecision {
    fn from(action: Action) -> Self {
        match action {
            Action::Allow => GateDecision {
                allow: true,
                redirect_to: None,
            },
            Action::RedirectTo(target) => GateDecision {
                allow: false,
                redirect_to: Some(target),
            },
        }
    }
}

/// RouteClass
///
/// Static classification of a request path. `Protected` only appears in
/// `GateMode::Global`, where unmatched paths require a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    UserScoped,
    AdminScoped,
    Protected,
}

/// GateMode
///
/// `Scoped` gates only `/user` and `/admin` and lets every other path fall through.
/// `Global` gates every non-public, non-asset path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateMode {
    #[default]
    Scoped,
    Global,
}

impl GateMode {
    /// Parses the `GATE_MODE` setting. Unknown values fall back to `Scoped`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "global" => GateMode::Global,
            _ => GateMode::Scoped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Allow,
    Login,
    Redirect(&'static str),
}

/// One row per caller kind. Every gated route class owns one table and is
/// evaluated by the same procedure.
struct RuleTable {
    anonymous: Outcome,
    user: Outcome,
    admin: Outcome,
    unknown_role: Outcome,
}

const USER_SCOPED_RULES: RuleTable = RuleTable {
    anonymous: Outcome::Login,
    user: Outcome::Allow,
    admin: Outcome::Allow,
    unknown_role: Outcome::Login,
};

const ADMIN_SCOPED_RULES: RuleTable = RuleTable {
    anonymous: Outcome::Login,
    user: Outcome::Redirect(ADMIN_DENIED_REDIRECT),
    admin: Outcome::Allow,
    unknown_role: Outcome::Login,
};

const PROTECTED_RULES: RuleTable = RuleTable {
    anonymous: Outcome::Login,
    user: Outcome::Redirect(USER_HOME),
    admin: Outcome::Allow,
    unknown_role: Outcome::Login,
};

impl RuleTable {
    fn outcome_for(&self, session: Option<&Session>) -> Outcome {
        match session.map(|s| s.role) {
            None => self.anonymous,
            Some(Some(Role::User)) => self.user,
            Some(Some(Role::Admin)) => self.admin,
            Some(None) => self.unknown_role,
        }
    }
}

/// Gate
///
/// Stateless request-authorization gate. Holds nothing but its matching mode,
/// so a single copy is shared by every request without coordination.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gate {
    mode: GateMode,
}

impl Gate {
    pub fn new(mode: GateMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> GateMode {
        self.mode
    }

    /// Classifies a path. Public prefixes win over everything else.
    pub fn classify(&self, path: &str) -> RouteClass {
        if is_public(path) {
            return RouteClass::Public;
        }
        if matches_prefix(path, USER_PREFIX) {
            return RouteClass::UserScoped;
        }
        if matches_prefix(path, ADMIN_PREFIX) {
            return RouteClass::AdminScoped;
        }
        match self.mode {
            GateMode::Scoped => RouteClass::Public,
            GateMode::Global if is_asset(path) => RouteClass::Public,
            GateMode::Global => RouteClass::Protected,
        }
    }

    /// Decides for a bare path; the callback carries the path alone.
    pub fn decide(&self, session: Option<&Session>, path: &str) -> Action {
        self.evaluate(session, path, path)
    }

    /// Decides for a full request target; the callback keeps the query string
    /// so the caller lands on the exact page after login.
    pub fn decide_request(
        &self,
        session: Option<&Session>,
        path: &str,
        query: Option<&str>,
    ) -> Action {
        match query.filter(|q| !q.is_empty()) {
            Some(query) => self.evaluate(session, path, &format!("{path}?{query}")),
            None => self.evaluate(session, path, path),
        }
    }

    fn evaluate(&self, session: Option<&Session>, path: &str, callback: &str) -> Action {
        let rules = match self.classify(path) {
            RouteClass::Public => return Action::Allow,
            RouteClass::UserScoped => &USER_SCOPED_RULES,
            RouteClass::AdminScoped => &ADMIN_SCOPED_RULES,
            RouteClass::Protected => &PROTECTED_RULES,
        };

        match rules.outcome_for(session) {
            Outcome::Allow => Action::Allow,
            Outcome::Login => Action::RedirectTo(login_redirect(callback)),
            Outcome::Redirect(target) => Action::RedirectTo(target.to_string()),
        }
    }
}

/// Decides with the default (scoped) rule set.
pub fn decide(session: Option<&Session>, path: &str) -> Action {
    Gate::default().decide(session, path)
}

/// Builds `/auth?callbackUrl=<encoded callback>`.
pub fn login_redirect(callback: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(callback.as_bytes()).collect();
    format!("{LOGIN_PATH}?{CALLBACK_PARAM}={encoded}")
}

/// Exact-segment prefix match: `/user` matches `/user` and `/user/..`, never `/usertest`.
fn matches_prefix(path: &str, base: &str) -> bool {
    path == base
        || path
            .strip_prefix(base)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn is_public(path: &str) -> bool {
    path == "/" || PUBLIC_PREFIXES.iter().any(|base| matches_prefix(path, base))
}

fn is_asset(path: &str) -> bool {
    if ASSET_PREFIXES.iter().any(|base| matches_prefix(path, base)) {
        return true;
    }
    let last_segment = path.rsplit('/').next().unwrap_or_default();
    last_segment
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| {
            !stem.is_empty() && ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(role: Option<Role>) -> Session {
        Session {
            user_id: Uuid::from_u128(7),
            email: "someone@example.com".to_string(),
            name: None,
            role,
            expires_at: None,
        }
    }

    const PUBLIC_PATHS: &[&str] = &[
        "/",
        "/(home)",
        "/(home)/about",
        "/auth",
        "/auth/sign-in",
        "/verify",
        "/api/health",
    ];
    const USER_PATHS: &[&str] = &["/user", "/user/settings", "/user/a/b/c"];
    const ADMIN_PATHS: &[&str] = &["/admin", "/admin/users", "/admin/settings/x"];

    #[test]
    fn public_paths_allow_any_session() {
        let sessions = [
            None,
            Some(session(Some(Role::User))),
            Some(session(Some(Role::Admin))),
            Some(session(None)),
        ];
        for mode in [GateMode::Scoped, GateMode::Global] {
            let gate = Gate::new(mode);
            for path in PUBLIC_PATHS {
                for s in &sessions {
                    assert_eq!(gate.decide(s.as_ref(), path), Action::Allow, "{path}");
                }
            }
        }
    }

    #[test]
    fn anonymous_user_paths_redirect_to_login_with_callback() {
        for path in USER_PATHS {
            let expected = format!(
                "/auth?callbackUrl={}",
                form_urlencoded::byte_serialize(path.as_bytes()).collect::<String>()
            );
            assert_eq!(decide(None, path), Action::RedirectTo(expected));
        }
    }

    #[test]
    fn user_role_reaches_user_area() {
        let user = session(Some(Role::User));
        for path in USER_PATHS {
            assert_eq!(decide(Some(&user), path), Action::Allow);
        }
    }

    #[test]
    fn user_role_is_denied_admin_area() {
        let user = session(Some(Role::User));
        for path in ADMIN_PATHS {
            assert_eq!(
                decide(Some(&user), path),
                Action::RedirectTo("/user?denied=1".to_string())
            );
        }
    }

    #[test]
    fn admin_role_is_allowed_everywhere() {
        let admin = session(Some(Role::Admin));
        let everything = PUBLIC_PATHS
            .iter()
            .chain(USER_PATHS)
            .chain(ADMIN_PATHS)
            .chain(&["/api/anything", "/reports/2024"]);
        for mode in [GateMode::Scoped, GateMode::Global] {
            for path in everything.clone() {
                assert_eq!(Gate::new(mode).decide(Some(&admin), path), Action::Allow);
            }
        }
    }

    #[test]
    fn unknown_role_is_treated_as_anonymous() {
        let odd = session(None);
        assert_eq!(decide(Some(&odd), "/user/settings"), decide(None, "/user/settings"));
        assert_eq!(decide(Some(&odd), "/admin"), decide(None, "/admin"));
    }

    #[test]
    fn prefix_match_respects_segments() {
        let gate = Gate::default();
        assert_eq!(gate.classify("/usertest"), RouteClass::Public);
        assert_eq!(gate.classify("/administrator"), RouteClass::Public);
        assert_eq!(gate.classify("/authors"), RouteClass::Public);
        assert_eq!(gate.classify("/user"), RouteClass::UserScoped);
        assert_eq!(gate.classify("/admin/"), RouteClass::AdminScoped);
        assert_eq!(decide(None, "/usertest"), Action::Allow);
    }

    #[test]
    fn scenarios() {
        assert_eq!(
            decide(None, "/user/settings"),
            Action::RedirectTo("/auth?callbackUrl=%2Fuser%2Fsettings".to_string())
        );
        assert_eq!(
            decide(Some(&session(Some(Role::User))), "/admin/users"),
            Action::RedirectTo("/user?denied=1".to_string())
        );
        assert_eq!(
            decide(Some(&session(Some(Role::Admin))), "/admin/users"),
            Action::Allow
        );
        assert_eq!(decide(None, "/"), Action::Allow);
    }

    #[test]
    fn decide_is_idempotent() {
        let user = session(Some(Role::User));
        for path in ["/", "/user/x", "/admin", "/elsewhere"] {
            assert_eq!(decide(Some(&user), path), decide(Some(&user), path));
            assert_eq!(decide(None, path), decide(None, path));
        }
    }

    #[test]
    fn callback_keeps_query_string() {
        let action = Gate::default().decide_request(None, "/user/settings", Some("tab=security"));
        assert_eq!(
            action,
            Action::RedirectTo("/auth?callbackUrl=%2Fuser%2Fsettings%3Ftab%3Dsecurity".to_string())
        );
        let bare = Gate::default().decide_request(None, "/user", Some(""));
        assert_eq!(bare, Action::RedirectTo("/auth?callbackUrl=%2Fuser".to_string()));
    }

    #[test]
    fn scoped_mode_lets_unmatched_paths_through() {
        let user = session(Some(Role::User));
        assert_eq!(decide(None, "/api/anything"), Action::Allow);
        assert_eq!(decide(Some(&user), "/reports"), Action::Allow);
    }

    #[test]
    fn global_mode_gates_unmatched_paths() {
        let gate = Gate::new(GateMode::Global);
        let user = session(Some(Role::User));
        assert_eq!(
            gate.decide(None, "/reports"),
            Action::RedirectTo("/auth?callbackUrl=%2Freports".to_string())
        );
        assert_eq!(
            gate.decide(Some(&user), "/reports"),
            Action::RedirectTo("/user".to_string())
        );
        assert_eq!(
            gate.decide(Some(&user), "/admin"),
            Action::RedirectTo("/user?denied=1".to_string())
        );
        assert_eq!(
            gate.decide(Some(&session(None)), "/reports"),
            Action::RedirectTo("/auth?callbackUrl=%2Freports".to_string())
        );
    }

    #[test]
    fn global_mode_skips_assets() {
        let gate = Gate::new(GateMode::Global);
        for path in ["/static/app.css", "/favicon.ico", "/img/logo.PNG", "/fonts/a.woff2"] {
            assert_eq!(gate.classify(path), RouteClass::Public, "{path}");
        }
        assert_eq!(gate.classify("/.env"), RouteClass::Protected);
        assert_eq!(gate.classify("/reports.pdf"), RouteClass::Protected);
    }

    #[test]
    fn gate_mode_parsing() {
        assert_eq!(GateMode::parse("global"), GateMode::Global);
        assert_eq!(GateMode::parse(" GLOBAL "), GateMode::Global);
        assert_eq!(GateMode::parse("scoped"), GateMode::Scoped);
        assert_eq!(GateMode::parse("bogus"), GateMode::Scoped);
    }

    #[test]
    fn decision_wire_format() {
        let allow = serde_json::to_value(GateDecision::from(Action::Allow)).unwrap();
        assert_eq!(allow, serde_json::json!({ "allow": true }));

        let redirect =
            serde_json::to_value(GateDecision::from(Action::RedirectTo("/user".to_string())))
                .unwrap();
        assert_eq!(
            redirect,
            serde_json::json!({ "allow": false, "redirectTo": "/user" })
        );
    }
}
