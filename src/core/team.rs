//! Team roster - identity lookup and role-based access for change orders

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Team roles for authorization
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Engineering,
    Quality,
    Management,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Engineering => write!(f, "engineering"),
            Role::Quality => write!(f, "quality"),
            Role::Management => write!(f, "management"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "engineering" => Ok(Role::Engineering),
            "quality" => Ok(Role::Quality),
            "management" => Ok(Role::Management),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Operations guarded by the access policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    EditApprovers,
    Submit,
    AcceptForReview,
    Review,
    Implement,
    Delete,
}

impl Action {
    /// Key used in the roster's approval matrix
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::EditApprovers => "edit_approvers",
            Action::Submit => "submit",
            Action::AcceptForReview => "accept",
            Action::Review => "review",
            Action::Implement => "implement",
            Action::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenied {
    #[error("'{0}' is not an active member of the team roster")]
    NotAMember(String),

    #[error("'{actor}' may not {action}: requires role {required}")]
    MissingRole {
        actor: String,
        action: Action,
        required: String,
    },

    #[error("'{actor}' may not vote on behalf of approver '{approver}'")]
    NotTheApprover { actor: String, approver: String },
}

/// Resolves user ids to display metadata
pub trait IdentityProvider {
    fn display_name(&self, user_id: &str) -> Option<String>;
}

/// Enforcement point for permission checks; the policy itself is supplied
/// by the embedding application
pub trait AccessPolicy {
    fn authorize(&self, actor: &str, action: Action) -> Result<(), AccessDenied>;

    /// Whether `user_id` may be listed as an approver
    fn admits_approver(&self, user_id: &str) -> Result<(), AccessDenied> {
        let _ = user_id;
        Ok(())
    }

    /// Whether `actor` may cast the vote of `approver`. Only the approver
    /// themself may, unless the policy allows proxy votes.
    fn may_vote_for(&self, actor: &str, approver: &str) -> Result<(), AccessDenied> {
        if actor == approver {
            Ok(())
        } else {
            Err(AccessDenied::NotTheApprover {
                actor: actor.to_string(),
                approver: approver.to_string(),
            })
        }
    }
}

/// Policy that allows everything (no roster configured)
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAccess;

impl AccessPolicy for OpenAccess {
    fn authorize(&self, _actor: &str, _action: Action) -> Result<(), AccessDenied> {
        Ok(())
    }

    fn may_vote_for(&self, _actor: &str, _approver: &str) -> Result<(), AccessDenied> {
        Ok(())
    }
}

impl IdentityProvider for OpenAccess {
    fn display_name(&self, _user_id: &str) -> Option<String> {
        None
    }
}

/// A team member with their roles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    pub email: String,
    /// Identifier used as actor and approver id
    pub username: String,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl TeamMember {
    /// Check if member has a specific role
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Check if member has any of the specified roles
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.roles.contains(r))
    }

    /// Check if member is an admin (can bypass authorization)
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

/// Team roster configuration (`.tcc/team.yaml`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRoster {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub members: Vec<TeamMember>,
    /// Action name -> roles allowed to perform it. Actions not listed are open
    /// to every member, except `implement`, which defaults to management.
    #[serde(default)]
    pub approval_matrix: HashMap<String, Vec<Role>>,
}

fn default_version() -> u32 {
    1
}

impl Default for TeamRoster {
    fn default() -> Self {
        Self {
            version: 1,
            members: Vec::new(),
            approval_matrix: HashMap::new(),
        }
    }
}

impl TeamRoster {
    /// Load a roster; a missing or unreadable file means no roster
    pub fn load_from_path(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        let contents = std::fs::read_to_string(path).ok()?;
        match serde_yml::from_str(&contents) {
            Ok(roster) => Some(roster),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable team roster");
                None
            }
        }
    }

    /// Save team roster to a specific path
    pub fn save_to_path(&self, path: &Path) -> std::io::Result<()> {
        let contents = serde_yml::to_string(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, contents)
    }

    /// Find an active member by username
    pub fn find_member(&self, username: &str) -> Option<&TeamMember> {
        self.members
            .iter()
            .find(|m| m.active && m.username.eq_ignore_ascii_case(username))
    }

    /// Roles required for an action, if restricted
    pub fn required_roles(&self, action: Action) -> Option<Vec<Role>> {
        match self.approval_matrix.get(action.as_str()) {
            Some(roles) => Some(roles.clone()),
            None if action == Action::Implement => Some(vec![Role::Management]),
            None => None,
        }
    }

    /// Check if a member may perform an action
    pub fn can_perform(&self, member: &TeamMember, action: Action) -> bool {
        // Admins can do anything
        if member.is_admin() {
            return true;
        }

        match self.required_roles(action) {
            Some(roles) => member.has_any_role(&roles),
            None => true,
        }
    }

    /// Add a member (replaces existing member with same username)
    pub fn add_member(&mut self, member: TeamMember) {
        self.members
            .retain(|m| !m.username.eq_ignore_ascii_case(&member.username));
        self.members.push(member);
    }

    /// Remove a member by username; returns whether anyone was removed
    pub fn remove_member(&mut self, username: &str) -> bool {
        let before = self.members.len();
        self.members
            .retain(|m| !m.username.eq_ignore_ascii_case(username));
        self.members.len() != before
    }

    /// Generate default team.yaml template content
    pub fn default_template() -> &'static str {
        r#"# Change control team roster
# Members listed here may act on change orders; approvers must be members.

version: 1

members: []
  # Example member entry:
  # - name: "Jane Smith"
  #   email: "jane@example.com"
  #   username: "jsmith"
  #   roles: [engineering, quality]
  #   active: true

# Which roles may perform which action. Unlisted actions are open to every
# member, except implement, which defaults to [management].
# Actions: create, edit_approvers, submit, accept, review, implement, delete
# Role options: engineering, quality, management, admin
approval_matrix: {}
  # accept: [quality]
  # implement: [management]
"#
    }
}

impl AccessPolicy for TeamRoster {
    fn authorize(&self, actor: &str, action: Action) -> Result<(), AccessDenied> {
        let member = self
            .find_member(actor)
            .ok_or_else(|| AccessDenied::NotAMember(actor.to_string()))?;

        if self.can_perform(member, action) {
            return Ok(());
        }

        let required = self
            .required_roles(action)
            .map(|roles| {
                roles
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(" or ")
            })
            .unwrap_or_else(|| "team member".to_string());
        Err(AccessDenied::MissingRole {
            actor: actor.to_string(),
            action,
            required,
        })
    }

    fn admits_approver(&self, user_id: &str) -> Result<(), AccessDenied> {
        self.find_member(user_id)
            .map(|_| ())
            .ok_or_else(|| AccessDenied::NotAMember(user_id.to_string()))
    }

    /// Admins may record a vote on an approver's behalf
    fn may_vote_for(&self, actor: &str, approver: &str) -> Result<(), AccessDenied> {
        let member = self
            .find_member(actor)
            .ok_or_else(|| AccessDenied::NotAMember(actor.to_string()))?;
        if member.username.eq_ignore_ascii_case(approver) || member.is_admin() {
            return Ok(());
        }
        Err(AccessDenied::NotTheApprover {
            actor: actor.to_string(),
            approver: approver.to_string(),
        })
    }
}

impl IdentityProvider for TeamRoster {
    fn display_name(&self, user_id: &str) -> Option<String> {
        self.find_member(user_id).map(|m| m.name.clone())
    }
}
