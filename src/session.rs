//! Who is signed in, and what they may see.
//!
//! A [`Session`] is resolved once per request from the auth cookie plus a role lookup in the
//! database (see [`crate::routes::authflow`]). Handlers receive it explicitly as a request
//! guard, there is no ambient "current user".

use serde::Serialize;
use thiserror::Error;

use crate::sql_interface::{Profile, Role};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Session {
    pub profile_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
}

impl Session {
    #[must_use]
    pub fn is_organizer(&self) -> bool {
        self.role.is_organizer()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&Profile> for Session {
    fn from(profile: &Profile) -> Self {
        Self {
            profile_id: profile.id,
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            email: profile.email.to_string(),
            role: profile.role,
        }
    }
}

/// What a route requires of the visitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Public,
    SignedIn,
    Organizer,
    Admin,
}

/// Why a visitor was turned away.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Denial {
    #[error("Sign-in required")]
    LoginRequired,
    #[error("Role not sufficient")]
    PermissionDenied,
}

impl Denial {
    /// Where the visitor is sent instead.
    #[must_use]
    pub fn redirect_target(self) -> &'static str {
        match self {
            Denial::LoginRequired => "/auth",
            Denial::PermissionDenied => "/",
        }
    }

    #[must_use]
    pub fn user_message(self) -> &'static str {
        match self {
            Denial::LoginRequired => "Please sign in to continue.",
            Denial::PermissionDenied => "You don't have permission to access this page.",
        }
    }
}

/// Decides whether a visitor with the given session may pass.
pub fn check_access(session: Option<&Session>, access: Access) -> Result<(), Denial> {
    let allowed = match (access, session) {
        (Access::Public, _) => true,
        (_, None) => return Err(Denial::LoginRequired),
        (Access::SignedIn, Some(_)) => true,
        (Access::Organizer, Some(session)) => session.is_organizer(),
        (Access::Admin, Some(session)) => session.is_admin(),
    };
    if allowed {
        Ok(())
    } else {
        Err(Denial::PermissionDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(role: Role) -> Session {
        Session {
            profile_id: 1,
            first_name: "Jean".to_string(),
            last_name: "Dupont".to_string(),
            email: "jean@example.com".to_string(),
            role,
        }
    }

    #[test]
    fn anonymous_visitors_must_sign_in() {
        assert_eq!(check_access(None, Access::Public), Ok(()));
        for access in [Access::SignedIn, Access::Organizer, Access::Admin] {
            assert_eq!(check_access(None, access), Err(Denial::LoginRequired));
        }
        assert_eq!(Denial::LoginRequired.redirect_target(), "/auth");
    }

    #[test]
    fn drivers_are_kept_out_of_dashboards() {
        let driver = session(Role::Driver);
        assert_eq!(check_access(Some(&driver), Access::SignedIn), Ok(()));
        assert_eq!(
            check_access(Some(&driver), Access::Organizer),
            Err(Denial::PermissionDenied)
        );
        assert_eq!(Denial::PermissionDenied.redirect_target(), "/");
    }

    #[test]
    fn admins_are_organizers_but_not_vice_versa() {
        let organizer = session(Role::Organizer);
        let admin = session(Role::Admin);
        assert!(organizer.is_organizer());
        assert!(admin.is_organizer());
        assert_eq!(check_access(Some(&admin), Access::Admin), Ok(()));
        assert_eq!(
            check_access(Some(&organizer), Access::Admin),
            Err(Denial::PermissionDenied)
        );
    }
}
