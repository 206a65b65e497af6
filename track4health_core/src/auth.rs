//! Login state, cached users and role checks.
//!
//! The signed-in user is persisted under `track4health_user` and every
//! user that has logged in on this device is cached under `cached_users`.
//! When the device is offline the cache allows a field worker to sign in
//! by username alone. That path performs no password check at all and is
//! controlled by `auth.allow_offline_login`.

use crate::storage::{keys, load_json, save_json, KeyValueStore};
use crate::sync::{ApiClient, Connectivity, Transport};
use crate::{Error, Location, Result, Role, User};
use chrono::{DateTime, Utc};

/// Who is signed in, plus the users remembered for offline login
#[derive(Clone, Debug, Default)]
pub struct AuthSession {
    current: Option<User>,
    cached: Vec<User>,
    allow_offline_login: bool,
}

impl AuthSession {
    /// Restore login state from storage
    pub fn load<S: KeyValueStore + ?Sized>(storage: &S, allow_offline_login: bool) -> Self {
        Self {
            current: load_json(storage, keys::CURRENT_USER),
            cached: load_json(storage, keys::CACHED_USERS).unwrap_or_default(),
            allow_offline_login,
        }
    }

    pub fn current_user(&self) -> Option<&User> {
        self.current.as_ref()
    }

    pub fn cached_users(&self) -> &[User] {
        &self.cached
    }

    /// The signed-in user, or an error telling the operator to log in
    pub fn require_user(&self) -> Result<&User> {
        self.current
            .as_ref()
            .ok_or_else(|| Error::Permission("not logged in".into()))
    }

    /// The signed-in user, provided their role passes `allowed`
    pub fn require_role<F>(&self, allowed: F, action: &str) -> Result<&User>
    where
        F: Fn(Role) -> bool,
    {
        let user = self.require_user()?;
        if !allowed(user.role) {
            return Err(Error::Permission(format!(
                "role {} may not {}",
                user.role, action
            )));
        }
        Ok(user)
    }

    /// Sign in against the API, falling back to the cache when offline
    ///
    /// Returns `Ok(None)` when the server rejects the credentials.
    pub fn login<S, T, C>(
        &mut self,
        storage: &mut S,
        api: &ApiClient<T, C>,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>>
    where
        S: KeyValueStore + ?Sized,
        T: Transport,
        C: Connectivity,
    {
        match api.login(username, password) {
            Ok(Some(mut user)) => {
                user.is_online = true;
                user.last_active = Some(now);
                self.remember(storage, user.clone())?;
                self.set_current(storage, Some(user.clone()))?;
                Ok(Some(user))
            }
            Ok(None) => Ok(None),
            Err(Error::Offline) => self.offline_login(storage, username, now),
            Err(e) => Err(e),
        }
    }

    fn offline_login<S: KeyValueStore + ?Sized>(
        &mut self,
        storage: &mut S,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        if !self.allow_offline_login {
            return Err(Error::Offline);
        }

        let cached = self
            .cached
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(username.trim()))
            .cloned();

        match cached {
            Some(mut user) => {
                tracing::warn!(
                    "Offline login for {} accepted from cache without password verification",
                    user.username
                );
                user.is_online = false;
                user.last_active = Some(now);
                self.set_current(storage, Some(user.clone()))?;
                Ok(Some(user))
            }
            None => {
                tracing::warn!("Offline login failed: {} has never signed in here", username);
                Err(Error::Offline)
            }
        }
    }

    pub fn logout<S: KeyValueStore + ?Sized>(&mut self, storage: &mut S) -> Result<()> {
        if let Some(user) = self.current.take() {
            tracing::info!("Logged out {}", user.username);
        }
        storage.remove(keys::CURRENT_USER)
    }

    /// Mark the current user active now
    pub fn heartbeat<S: KeyValueStore + ?Sized>(
        &mut self,
        storage: &mut S,
        online: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut user = self.require_user()?.clone();
        user.is_online = online;
        user.last_active = Some(now);
        self.set_current(storage, Some(user))
    }

    /// Record the current user's last known position locally
    pub fn set_location<S: KeyValueStore + ?Sized>(
        &mut self,
        storage: &mut S,
        location: Location,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let mut user = self.require_user()?.clone();
        user.location = Some(location);
        user.last_active = Some(now);
        self.set_current(storage, Some(user.clone()))?;
        Ok(user)
    }

    fn set_current<S: KeyValueStore + ?Sized>(
        &mut self,
        storage: &mut S,
        user: Option<User>,
    ) -> Result<()> {
        match user {
            Some(ref user) => save_json(storage, keys::CURRENT_USER, user)?,
            None => storage.remove(keys::CURRENT_USER)?,
        }
        self.current = user;
        Ok(())
    }

    /// Add or refresh a user in the offline cache
    fn remember<S: KeyValueStore + ?Sized>(&mut self, storage: &mut S, user: User) -> Result<()> {
        let mut next: Vec<User> = self
            .cached
            .iter()
            .filter(|u| !u.username.eq_ignore_ascii_case(&user.username))
            .cloned()
            .collect();
        next.push(user);
        save_json(storage, keys::CACHED_USERS, &next)?;
        self.cached = next;
        Ok(())
    }
}
