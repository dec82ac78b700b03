//! One client connection to the gateway.
//!
//! A [`Session`] owns the client's identity and a channel to the resolver. The
//! client talks to the session's bootstrap capability: gateway methods are
//! answered locally, anything else passes the role filter and is forwarded to
//! the resolver with its payload untouched.
//!
//! Inventory entries looked up for the role filter are cached per session for
//! [`METHOD_CACHE_TTL`], so repeated calls skip the resolver lookup.
//!
//! Every capability handed out through a session is wrapped in a [`SessionCap`].
//! Once the session is released those wrappers fail with `Transport`, wherever
//! the handle has ended up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hiveot_authn::{CredentialStore, SessionAuth, TokenPair};
use hiveot_kernel::{AuthType, CapabilityInfo, HubError, HubResult, MethodKey};
use hiveot_resolver::ResolverClient;
use hiveot_rpc::{Client, ClientHook, Forwarder, MethodCall, Payload, ServerBuilder, UnknownMethodHandler};
use hiveot_runtime::PeerIdentity;
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::*;

/// How long a looked-up inventory entry is trusted by the role filter.
pub const METHOD_CACHE_TTL: Duration = Duration::from_secs(1);

/// Server-side state of one client connection.
pub struct Session {
    id: String,
    remote_addr: String,
    identity: RwLock<ClientInfo>,
    /// Taken on release; dropping it closes a dialed resolver channel.
    resolver: Mutex<Option<ResolverClient>>,
    methods: Mutex<HashMap<MethodKey, (CapabilityInfo, Instant)>>,
    released: CancellationToken,
    auth: Arc<SessionAuth>,
    store: Arc<dyn CredentialStore>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        remote_addr: impl Into<String>,
        peer: Option<&PeerIdentity>,
        resolver: ResolverClient,
        auth: Arc<SessionAuth>,
        store: Arc<dyn CredentialStore>,
    ) -> Arc<Self> {
        let identity = match peer {
            Some(peer) => ClientInfo {
                client_id: peer.client_id.clone(),
                auth_type: peer.auth_type(),
            },
            None => ClientInfo::unauthenticated(),
        };
        Arc::new(Self {
            id: id.into(),
            remote_addr: remote_addr.into(),
            identity: RwLock::new(identity),
            resolver: Mutex::new(Some(resolver)),
            methods: Mutex::new(HashMap::new()),
            released: CancellationToken::new(),
            auth,
            store,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn client_info(&self) -> ClientInfo {
        self.identity.read().clone()
    }

    pub fn auth_type(&self) -> AuthType {
        self.identity.read().auth_type
    }

    pub fn is_released(&self) -> bool {
        self.released.is_cancelled()
    }

    /// Drop the resolver channel and break every handle given out.
    pub fn release(&self) {
        if self.released.is_cancelled() {
            return;
        }
        self.released.cancel();
        let resolver = self.resolver.lock().take();
        drop(resolver);
        self.methods.lock().clear();
        let info = self.client_info();
        info!(session_id = %self.id, client_id = %info.client_id, "session released");
    }

    fn resolver(&self) -> HubResult<ResolverClient> {
        self.resolver
            .lock()
            .clone()
            .ok_or_else(|| HubError::transport(format!("session {} is released", self.id)))
    }

    fn set_identity(&self, client_id: &str, auth_type: AuthType) {
        *self.identity.write() = ClientInfo {
            client_id: client_id.to_string(),
            auth_type,
        };
        info!(session_id = %self.id, client_id, %auth_type, "session identity changed");
    }

    pub fn ping(&self) -> ClientInfo {
        self.client_info()
    }

    /// Check the password and switch the session to `(client_id, User)`.
    /// On failure the identity is unchanged.
    pub async fn login(&self, client_id: &str, password: &str) -> HubResult<TokenPair> {
        let pair = self.auth.login(self.store.as_ref(), client_id, password).await.inspect_err(|err| {
            warn!(session_id = %self.id, client_id, "login failed: {err}");
        })?;
        self.set_identity(client_id, AuthType::User);
        Ok(pair)
    }

    pub fn refresh(&self, client_id: &str, refresh_token: &str) -> HubResult<TokenPair> {
        let pair = self.auth.refresh(client_id, refresh_token)?;
        self.set_identity(client_id, AuthType::User);
        Ok(pair)
    }

    /// Resume a login made on an earlier connection.
    pub fn authenticate(&self, client_id: &str, access_token: &str) -> HubResult<ClientInfo> {
        self.auth.authenticate(client_id, access_token)?;
        self.set_identity(client_id, AuthType::User);
        Ok(self.client_info())
    }

    pub async fn list_capabilities(&self) -> HubResult<Vec<CapabilityInfo>> {
        let resolver = self.resolver()?;
        let auth_type = self.auth_type();
        self.until_released(resolver.list_capabilities(auth_type)).await
    }

    /// Inventory entry of `key`, if the session role may call it.
    ///
    /// Unknown keys are `Forbidden`, the same as keys the role is not admitted
    /// to, so nothing is forwarded without a matching entry.
    pub async fn authorize(&self, key: MethodKey) -> HubResult<CapabilityInfo> {
        let auth_type = self.auth_type();
        let cap = match self.lookup_method(key).await {
            Ok(cap) => cap,
            Err(HubError::NotFound(_)) => {
                warn!(session_id = %self.id, method = %key, "rejecting call to unknown method");
                return Err(HubError::forbidden(format!("method {key} is not available")));
            }
            Err(err) => return Err(err),
        };
        if !cap.admits(auth_type) {
            warn!(session_id = %self.id, %auth_type, capability = %cap.external_name(), "role not admitted");
            return Err(HubError::forbidden(format!(
                "{} does not admit role {auth_type}",
                cap.external_name()
            )));
        }
        Ok(cap)
    }

    async fn lookup_method(&self, key: MethodKey) -> HubResult<CapabilityInfo> {
        if let Some((cap, at)) = self.methods.lock().get(&key) {
            if at.elapsed() < METHOD_CACHE_TTL {
                return Ok(cap.clone());
            }
        }
        let resolver = self.resolver()?;
        let cap = self.until_released(resolver.find_method(key)).await?;
        self.methods.lock().insert(key, (cap.clone(), Instant::now()));
        Ok(cap)
    }

    /// Role-check `call` and forward it through the resolver.
    pub async fn forward(&self, call: MethodCall) -> HubResult<Payload> {
        let cap = self.authorize(call.key).await?;
        let forwarder = Forwarder::new(self.resolver()?.client().clone());
        debug!(session_id = %self.id, capability = %cap.external_name(), "forwarding");
        self.until_released(forwarder.forward_wrapped(call, |cap| self.guard(cap)))
            .await
    }

    /// A handle that only invokes `service_id/method_name`.
    pub async fn get_capability(&self, service_id: &str, method_name: &str) -> HubResult<Client> {
        let resolver = self.resolver()?;
        let cap = self.until_released(resolver.find_capability(service_id, method_name)).await?;
        let auth_type = self.auth_type();
        if !cap.admits(auth_type) {
            return Err(HubError::forbidden(format!(
                "{} does not admit role {auth_type}",
                cap.external_name()
            )));
        }
        let method = MethodCap {
            info: cap,
            resolver: Forwarder::new(resolver.client().clone()),
        };
        Ok(self.guard(Client::new(method)))
    }

    fn guard(&self, cap: Client) -> Client {
        Client::new(SessionCap {
            inner: Forwarder::new(cap),
            released: self.released.clone(),
        })
    }

    async fn until_released<T>(&self, fut: impl std::future::Future<Output = HubResult<T>>) -> HubResult<T> {
        tokio::select! {
            _ = self.released.cancelled() => Err(HubError::transport(format!("session {} is released", self.id))),
            result = fut => result,
        }
    }

    /// The capability offered to the client on connect.
    pub fn bootstrap(self: &Arc<Self>) -> Client {
        let ping = Arc::clone(self);
        let login = Arc::clone(self);
        let refresh = Arc::clone(self);
        let authenticate = Arc::clone(self);
        let list = Arc::clone(self);
        let get = Arc::clone(self);
        let server = ServerBuilder::new(format!("{SERVICE_ID}-session-{}", self.id))
            .typed(&PING, move |_: ()| {
                let info = ping.ping();
                async move { Ok::<_, HubError>(info) }
            })
            .typed(&LOGIN, move |args: LoginArgs| {
                let session = Arc::clone(&login);
                async move { session.login(&args.client_id, &args.password).await }
            })
            .typed(&REFRESH, move |args: RefreshArgs| {
                let result = refresh.refresh(&args.client_id, &args.refresh_token);
                async move { result }
            })
            .typed(&AUTHENTICATE, move |args: AuthenticateArgs| {
                let result = authenticate.authenticate(&args.client_id, &args.access_token);
                async move { result }
            })
            .typed(&LIST_CAPABILITIES, move |_: ()| {
                let session = Arc::clone(&list);
                async move { session.list_capabilities().await }
            })
            .method(&GET_CAPABILITY, move |params: Payload| {
                let session = Arc::clone(&get);
                async move {
                    let args: GetCapabilityArgs = params.decode()?;
                    let cap = session.get_capability(&args.service_id, &args.method_name).await?;
                    Payload::from_cap(cap)
                }
            })
            .with_unknown_method_handler(Arc::new(SessionForwarder(Arc::clone(self))))
            .build();
        Client::new(server)
    }
}

struct SessionForwarder(Arc<Session>);

#[async_trait]
impl UnknownMethodHandler for SessionForwarder {
    async fn handle_unknown_method(&self, call: MethodCall) -> HubResult<Payload> {
        self.0.forward(call).await
    }
}

/// Capability issued by a session. Fails with `Transport` once the session is
/// released; capabilities it returns are wrapped the same way.
pub struct SessionCap {
    inner: Forwarder,
    released: CancellationToken,
}

#[async_trait]
impl ClientHook for SessionCap {
    async fn call(&self, call: MethodCall) -> HubResult<Payload> {
        if self.released.is_cancelled() {
            return Err(HubError::transport("session released"));
        }
        let released = self.released.clone();
        let wrap = |inner: Client| {
            Client::new(SessionCap {
                inner: Forwarder::new(inner),
                released: released.clone(),
            })
        };
        tokio::select! {
            _ = self.released.cancelled() => Err(HubError::transport("session released")),
            reply = self.inner.forward_wrapped(call, wrap) => reply,
        }
    }

    fn is_valid(&self) -> bool {
        !self.released.is_cancelled() && self.inner.target().is_valid()
    }

    fn describe(&self) -> String {
        format!("session cap {:?}", self.inner.target())
    }
}

/// Grants a single method of a service, reached through the resolver channel.
struct MethodCap {
    info: CapabilityInfo,
    resolver: Forwarder,
}

#[async_trait]
impl ClientHook for MethodCap {
    async fn call(&self, call: MethodCall) -> HubResult<Payload> {
        if call.key != self.info.key() {
            return Err(HubError::forbidden(format!(
                "capability {} does not grant method {}",
                self.info.external_name(),
                call.key
            )));
        }
        self.resolver.forward(call).await
    }

    fn is_valid(&self) -> bool {
        self.resolver.target().is_valid()
    }

    fn describe(&self) -> String {
        self.info.external_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Hub, ECHO, HELLO, HIDDEN};
    use hiveot_authn::MemoryCredentialStore;
    use hiveot_kernel::CertRole;
    use hiveot_resolver::api::FIND_METHOD;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn open(hub: &Hub, peer: Option<PeerIdentity>) -> (Client, crate::gateway::SessionGuard) {
        hub.gateway.open_session(peer, "test".into()).await.unwrap()
    }

    fn device(id: &str) -> PeerIdentity {
        PeerIdentity {
            client_id: id.to_string(),
            role: CertRole::IoTDevice,
            cert_der: Vec::new(),
        }
    }

    #[tokio::test]
    async fn role_filter_rejects_before_forwarding() {
        let dir = tempfile::tempdir().unwrap();
        let hub = Hub::start(dir.path()).await;
        let (session, _guard) = open(&hub, Some(device("sensor1"))).await;

        let info: ClientInfo = session.invoke(&PING, &()).await.unwrap();
        assert_eq!(info.client_id, "sensor1");
        assert_eq!(info.auth_type, AuthType::IoTDevice);

        let err = session.invoke::<_, String>(&ECHO, "hi").await.unwrap_err();
        assert!(matches!(err, HubError::Forbidden(_)), "{err}");
        assert_eq!(hub.echo_calls(), 0);

        // not in the inventory at all
        let err = session.invoke::<_, String>(&HIDDEN, &()).await.unwrap_err();
        assert!(matches!(err, HubError::Forbidden(_)), "{err}");

        let hello: String = session.invoke(&HELLO, &()).await.unwrap();
        assert_eq!(hello, "hello");
        let caps: Vec<CapabilityInfo> = session.invoke(&LIST_CAPABILITIES, &()).await.unwrap();
        let names: Vec<_> = caps.iter().map(|c| c.method_name.as_str()).collect();
        assert_eq!(names, vec!["Hello"]);
    }

    #[tokio::test]
    async fn login_grants_user_role() {
        let dir = tempfile::tempdir().unwrap();
        let hub = Hub::start(dir.path()).await;
        let (session, _guard) = open(&hub, None).await;

        let bad = LoginArgs {
            client_id: "alice".into(),
            password: "wrong".into(),
        };
        let err = session.invoke::<_, TokenPair>(&LOGIN, &bad).await.unwrap_err();
        assert!(matches!(err, HubError::Unauthorized(_)));
        let info: ClientInfo = session.invoke(&PING, &()).await.unwrap();
        assert_eq!(info, ClientInfo::unauthenticated());

        let args = LoginArgs {
            client_id: "alice".into(),
            password: "pw1".into(),
        };
        let pair: TokenPair = session.invoke(&LOGIN, &args).await.unwrap();
        let info: ClientInfo = session.invoke(&PING, &()).await.unwrap();
        assert_eq!(info.auth_type, AuthType::User);
        let reply: String = session.invoke(&ECHO, "hi").await.unwrap();
        assert_eq!(reply, "hi");
        assert_eq!(hub.echo_calls(), 1);

        // a second connection resumes with the access token
        let (other, _other_guard) = open(&hub, None).await;
        let resumed = AuthenticateArgs {
            client_id: "alice".into(),
            access_token: pair.access_token.clone(),
        };
        let info: ClientInfo = other.invoke(&AUTHENTICATE, &resumed).await.unwrap();
        assert_eq!(info.client_id, "alice");
        assert_eq!(info.auth_type, AuthType::User);
        let forged = AuthenticateArgs {
            client_id: "bob".into(),
            access_token: pair.access_token,
        };
        assert!(other.invoke::<_, ClientInfo>(&AUTHENTICATE, &forged).await.is_err());
    }

    #[tokio::test]
    async fn released_session_breaks_its_handles() {
        let dir = tempfile::tempdir().unwrap();
        let hub = Hub::start(dir.path()).await;
        let (session, guard) = open(&hub, None).await;
        let args = LoginArgs {
            client_id: "alice".into(),
            password: "pw1".into(),
        };
        let _: TokenPair = session.invoke(&LOGIN, &args).await.unwrap();

        let echo = session
            .invoke_cap(
                &GET_CAPABILITY,
                &GetCapabilityArgs {
                    service_id: "echo".into(),
                    method_name: "Echo".into(),
                },
            )
            .await
            .unwrap();
        let reply: String = echo.invoke(&ECHO, "one").await.unwrap();
        assert_eq!(reply, "one");
        // the handle grants Echo only
        let err = echo.invoke::<_, String>(&HELLO, &()).await.unwrap_err();
        assert!(matches!(err, HubError::Forbidden(_)));

        assert_eq!(hub.gateway.session_count(), 1);
        drop(guard);
        assert_eq!(hub.gateway.session_count(), 0);
        assert!(!echo.is_valid());
        let err = echo.invoke::<_, String>(&ECHO, "two").await.unwrap_err();
        assert!(err.is_transport(), "{err}");
        let err = session.invoke::<_, String>(&ECHO, "three").await.unwrap_err();
        assert!(err.is_transport(), "{err}");
        assert_eq!(hub.echo_calls(), 1);
    }

    /// Resolver channel that counts `FindMethod` lookups.
    struct CountingResolver {
        inner: Client,
        finds: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ClientHook for CountingResolver {
        async fn call(&self, call: MethodCall) -> HubResult<Payload> {
            if call.key == FIND_METHOD.key() {
                self.finds.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.call(call).await
        }

        fn describe(&self) -> String {
            "counting resolver".to_string()
        }
    }

    #[tokio::test]
    async fn role_filter_reuses_recent_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let hub = Hub::start(dir.path()).await;
        let finds = Arc::new(AtomicUsize::new(0));
        let resolver = ResolverClient::new(Client::new(CountingResolver {
            inner: hub.resolver.provider().unwrap().client(),
            finds: Arc::clone(&finds),
        }));
        let store = MemoryCredentialStore::new();
        store.add_user("alice", "pw1").unwrap();
        let auth = Arc::new(SessionAuth::generate("test").unwrap());
        let session = Session::new("s1", "test", Some(&device("sensor1")), resolver, auth, Arc::new(store));
        let client = session.bootstrap();

        for _ in 0..3 {
            let hello: String = client.invoke(&HELLO, &()).await.unwrap();
            assert_eq!(hello, "hello");
        }
        assert_eq!(finds.load(Ordering::SeqCst), 1);

        for _ in 0..2 {
            let err = client.invoke::<_, String>(&ECHO, "hi").await.unwrap_err();
            assert!(matches!(err, HubError::Forbidden(_)), "{err}");
        }
        assert_eq!(finds.load(Ordering::SeqCst), 2);

        // the cached entry is checked against the role at call time
        let args = LoginArgs {
            client_id: "alice".into(),
            password: "pw1".into(),
        };
        let _: TokenPair = client.invoke(&LOGIN, &args).await.unwrap();
        let reply: String = client.invoke(&ECHO, "hi").await.unwrap();
        assert_eq!(reply, "hi");
        assert_eq!(finds.load(Ordering::SeqCst), 2);
        assert_eq!(hub.echo_calls(), 1);

        tokio::time::sleep(METHOD_CACHE_TTL + Duration::from_millis(50)).await;
        let _: String = client.invoke(&HELLO, &()).await.unwrap();
        assert_eq!(finds.load(Ordering::SeqCst), 3);
        session.release();
    }
}
