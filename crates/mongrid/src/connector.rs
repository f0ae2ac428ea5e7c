//! Pool establishment seam.
//!
//! The registry never talks to the driver directly: it asks a [`Connector`]
//! to open, ping and close pools. [`MongoConnector`] is the production
//! implementation over [`mongodb::Client`]; tests inject a counting mock.

use std::future::Future;
use std::time::Duration;

use mongodb::Client;
use mongodb::bson::doc;
use mongodb::options::{ClientOptions, Credential, ServerAddress};
use mongrid_core::{MongoConfig, PoolKey};

/// Options used to establish one pool, derived from a [`MongoConfig`].
///
/// Zero pool sizes and a zero idle time in the configuration become `None`
/// here, which leaves the driver default in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    pub key: PoolKey,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
    pub max_pool_size: Option<u32>,
    pub min_pool_size: Option<u32>,
    pub max_idle_time: Option<Duration>,
}

impl ConnectOptions {
    pub fn from_config(config: &MongoConfig) -> Self {
        let (username, password) = match config.credentials() {
            Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
            None => (None, None),
        };
        Self {
            key: config.key(),
            username,
            password,
            connect_timeout: config.connect_timeout_or_default(),
            max_pool_size: (config.max_pool_size != 0).then_some(config.max_pool_size),
            min_pool_size: (config.min_pool_size != 0).then_some(config.min_pool_size),
            max_idle_time: (!config.max_conn_idle_time.is_zero())
                .then_some(config.max_conn_idle_time),
        }
    }
}

/// Factory for pools, injected into the registry.
///
/// Errors are reported as plain strings; the registry wraps them into
/// [`PoolError::Connection`](crate::PoolError::Connection) together with the
/// endpoint they belong to.
pub trait Connector: Send + Sync + 'static {
    /// The pool type handed out inside a [`Handle`](crate::Handle).
    type Pool: Send + Sync + 'static;

    /// Establish a new pool for the given options.
    fn connect(
        &self,
        options: &ConnectOptions,
    ) -> impl Future<Output = Result<Self::Pool, String>> + Send;

    /// Round-trip to the server confirming the pool is usable.
    fn ping(&self, pool: &Self::Pool) -> impl Future<Output = Result<(), String>> + Send;

    /// Close the pool. Failures are not reported.
    fn disconnect(&self, pool: &Self::Pool) -> impl Future<Output = ()> + Send;
}

/// [`Connector`] backed by the official MongoDB driver.
#[derive(Clone, Debug, Default)]
pub struct MongoConnector {
    app_name: Option<String>,
}

impl MongoConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `app_name` to the server in the connection handshake.
    pub fn with_app_name(app_name: impl Into<String>) -> Self {
        Self {
            app_name: Some(app_name.into()),
        }
    }

    fn client_options(&self, options: &ConnectOptions) -> ClientOptions {
        let mut client_options = ClientOptions::builder()
            .hosts(vec![ServerAddress::Tcp {
                host: options.key.host.clone(),
                port: Some(options.key.port),
            }])
            .build();

        if let (Some(user), Some(pass)) = (&options.username, &options.password) {
            client_options.credential = Some(
                Credential::builder()
                    .username(user.clone())
                    .password(pass.clone())
                    .build(),
            );
        }
        client_options.connect_timeout = Some(options.connect_timeout);
        client_options.server_selection_timeout = Some(options.connect_timeout);
        client_options.max_pool_size = options.max_pool_size;
        client_options.min_pool_size = options.min_pool_size;
        client_options.max_idle_time = options.max_idle_time;
        client_options.app_name = self.app_name.clone();
        client_options
    }
}

impl Connector for MongoConnector {
    type Pool = Client;

    async fn connect(&self, options: &ConnectOptions) -> Result<Client, String> {
        Client::with_options(self.client_options(options)).map_err(|e| e.to_string())
    }

    async fn ping(&self, pool: &Client) -> Result<(), String> {
        pool.database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn disconnect(&self, pool: &Client) {
        pool.clone().shutdown().immediate(true).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_options_zero_means_driver_default() {
        let options = ConnectOptions::from_config(&MongoConfig::new("db", 27017));
        assert_eq!(options.max_pool_size, None);
        assert_eq!(options.min_pool_size, None);
        assert_eq!(options.max_idle_time, None);
        assert_eq!(options.connect_timeout, mongrid_core::config::DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn connect_options_apply_non_zero_values() {
        let config = MongoConfig {
            max_pool_size: 25,
            min_pool_size: 5,
            max_conn_idle_time: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(2),
            ..MongoConfig::new("db", 27017)
        };
        let options = ConnectOptions::from_config(&config);
        assert_eq!(options.max_pool_size, Some(25));
        assert_eq!(options.min_pool_size, Some(5));
        assert_eq!(options.max_idle_time, Some(Duration::from_secs(60)));
        assert_eq!(options.connect_timeout, Duration::from_secs(2));
    }

    #[test]
    fn connect_options_require_both_credentials() {
        let config = MongoConfig {
            username: Some("app".into()),
            ..MongoConfig::new("db", 27017)
        };
        let options = ConnectOptions::from_config(&config);
        assert!(options.username.is_none());
        assert!(options.password.is_none());
    }

    #[test]
    fn client_options_carry_endpoint_and_bounds() {
        let config = MongoConfig {
            username: Some("app".into()),
            password: Some("secret".into()),
            max_pool_size: 8,
            ..MongoConfig::new("mongo.internal", 27018)
        };
        let connector = MongoConnector::with_app_name("mongrid-test");
        let client_options = connector.client_options(&ConnectOptions::from_config(&config));

        assert_eq!(
            client_options.hosts,
            vec![ServerAddress::Tcp {
                host: "mongo.internal".to_string(),
                port: Some(27018),
            }]
        );
        assert_eq!(client_options.max_pool_size, Some(8));
        assert_eq!(client_options.min_pool_size, None);
        assert_eq!(client_options.app_name.as_deref(), Some("mongrid-test"));
        let credential = client_options.credential.expect("credential set");
        assert_eq!(credential.username.as_deref(), Some("app"));
    }
}
