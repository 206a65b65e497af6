//! Explicit application state.
//!
//! Holds the configuration, the record store and the login session. It is
//! passed by reference to whatever needs it; persistence happens as part
//! of each mutating call, not as a side effect of reading.

use crate::auth::AuthSession;
use crate::dashboard::RecordFilter;
use crate::storage::{FileStore, KeyValueStore};
use crate::store::RecordStore;
use crate::sync::{ApiClient, Connectivity, HttpTransport, StaticConnectivity, Transport};
use crate::{Config, Location, Result, User};
use chrono::Utc;

pub struct AppState<S: KeyValueStore> {
    pub config: Config,
    pub records: RecordStore<S>,
    pub auth: AuthSession,
}

impl AppState<FileStore> {
    /// Open the file-backed state under `config.data.data_dir`
    pub fn open(config: Config) -> Self {
        let storage = FileStore::new(&config.data.data_dir);
        Self::with_storage(config, storage)
    }
}

impl<S: KeyValueStore> AppState<S> {
    pub fn with_storage(config: Config, storage: S) -> Self {
        let auth = AuthSession::load(&storage, config.auth.allow_offline_login);
        let records = RecordStore::open(storage);
        Self {
            config,
            records,
            auth,
        }
    }

    pub fn login<T: Transport, C: Connectivity>(
        &mut self,
        api: &ApiClient<T, C>,
        username: &str,
        password: &str,
    ) -> Result<Option<User>> {
        self.auth.login(
            self.records.storage_mut(),
            api,
            username,
            password,
            Utc::now(),
        )
    }

    pub fn logout(&mut self) -> Result<()> {
        self.auth.logout(self.records.storage_mut())
    }

    /// Store the position locally, then report it to the server
    ///
    /// The local update stands even if the remote call fails.
    pub fn update_location<T: Transport, C: Connectivity>(
        &mut self,
        api: &ApiClient<T, C>,
        location: Location,
    ) -> Result<User> {
        let user = self
            .auth
            .set_location(self.records.storage_mut(), location, Utc::now())?;
        api.update_location(&user.id, location)?;
        Ok(user)
    }

    /// A filter limited to what the signed-in user may see
    pub fn visible_filter(&self, filter: RecordFilter) -> RecordFilter {
        match self.auth.current_user() {
            Some(user) => filter.scoped_to(user),
            None => filter,
        }
    }
}

/// Build the HTTP client described by `config`
pub fn api_client(
    config: &Config,
    force_offline: bool,
) -> Result<ApiClient<HttpTransport, StaticConnectivity>> {
    let transport = HttpTransport::new(&config.api.base_url, config.api.timeout_secs)?;
    let connectivity = if force_offline || config.api.offline {
        StaticConnectivity::offline()
    } else {
        StaticConnectivity::online()
    };
    Ok(ApiClient::new(transport, connectivity))
}
