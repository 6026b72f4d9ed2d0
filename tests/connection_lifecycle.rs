// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use async_trait::async_trait;
use lapin::Channel;
use rabbitmq_connection::{
    broker::{BrokerConnection, ConnectParams, Connector},
    close::CloseSpec,
    config::{ConnectionConfiguration, Seconds, SecureSocket, TrustStoreConfig},
    connection::is_closed,
    errors::RabbitMqError,
    factory::ConnectionFactory,
    observability::{ConnectionInfo, ConnectionObserver, ErrorType},
};
use std::{
    io::Write,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

#[derive(Default)]
struct FakeBroker {
    open: AtomicBool,
    close_delay: Option<Duration>,
    closes: Mutex<Vec<(u16, String)>>,
}

#[async_trait]
impl BrokerConnection for FakeBroker {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self, reply_code: u16, reply_text: &str) -> Result<(), lapin::Error> {
        if let Some(delay) = self.close_delay {
            tokio::time::sleep(delay).await;
        }
        if !self.open.swap(false, Ordering::SeqCst) {
            return Err(lapin::Error::InvalidConnectionState(
                lapin::ConnectionState::Closed,
            ));
        }
        self.closes
            .lock()
            .unwrap()
            .push((reply_code, reply_text.to_owned()));
        Ok(())
    }

    async fn create_channel(&self) -> Result<Channel, lapin::Error> {
        Err(lapin::Error::ChannelsLimitReached)
    }
}

struct FakeConnector {
    broker: Arc<FakeBroker>,
    delay: Option<Duration>,
    seen: Mutex<Vec<ConnectParams>>,
    cancelled: Arc<AtomicBool>,
}

impl FakeConnector {
    fn new(broker: Arc<FakeBroker>) -> Arc<FakeConnector> {
        Arc::new(FakeConnector {
            broker,
            delay: None,
            seen: Mutex::new(vec![]),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// Flags a connect attempt dropped before it finished.
struct CancelGuard(Option<Arc<AtomicBool>>);

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(flag) = self.0.take() {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        params: &ConnectParams,
    ) -> Result<Arc<dyn BrokerConnection>, lapin::Error> {
        let mut guard = CancelGuard(Some(self.cancelled.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        guard.0 = None;

        self.seen.lock().unwrap().push(params.clone());
        self.broker.open.store(true, Ordering::SeqCst);
        Ok(self.broker.clone())
    }
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ConnectionObserver for RecordingObserver {
    fn connection_opened(&self, connection: &ConnectionInfo) {
        self.events
            .lock()
            .unwrap()
            .push(format!("opened:{}", connection.name));
    }

    fn connection_closed(&self, connection: &ConnectionInfo) {
        self.events
            .lock()
            .unwrap()
            .push(format!("closed:{}", connection.name));
    }

    fn error(&self, error_type: ErrorType) {
        self.events
            .lock()
            .unwrap()
            .push(format!("error:{}", error_type));
    }
}

fn factory(connector: Arc<FakeConnector>, observer: Arc<RecordingObserver>) -> ConnectionFactory {
    ConnectionFactory::new().connector(connector).observer(observer)
}

#[tokio::test]
async fn open_close_and_query() {
    let broker = Arc::new(FakeBroker::default());
    let observer = Arc::new(RecordingObserver::default());
    let factory = factory(FakeConnector::new(broker.clone()), observer.clone());

    let cfg = ConnectionConfiguration::new().connection_name("billing");
    let conn = factory.new_connection("localhost", 5672, &cfg).await.unwrap();

    assert!(!is_closed(Some(&conn)));

    conn.close_with(Some(200), Some("bye"), Some(5000))
        .await
        .unwrap();

    assert!(is_closed(Some(&conn)));
    assert_eq!(
        broker.closes.lock().unwrap().clone(),
        vec![(200, "bye".to_owned())]
    );

    // closing twice is up to the client library; here it reports an invalid state
    let second = conn.close(CloseSpec::Default).await;
    assert!(matches!(second, Err(RabbitMqError::ConnectionCloseError(_))));
    assert!(is_closed(Some(&conn)));

    assert_eq!(
        observer.events(),
        vec![
            "opened:billing".to_owned(),
            "closed:billing".to_owned(),
            "error:connection_close".to_owned(),
        ]
    );
}

#[tokio::test]
async fn abort_always_ends_closed() {
    let broker = Arc::new(FakeBroker::default());
    let observer = Arc::new(RecordingObserver::default());
    let factory = factory(FakeConnector::new(broker.clone()), observer.clone());

    let cfg = ConnectionConfiguration::new().connection_name("audit");
    let conn = factory.new_connection("localhost", 5672, &cfg).await.unwrap();

    conn.abort(CloseSpec::Default).await;
    assert!(conn.is_closed());

    // aborting an already closed connection is still silent
    conn.abort_with(Some(320), Some("again"), Some(100)).await;
    assert!(conn.is_closed());

    assert_eq!(
        observer.events(),
        vec![
            "opened:audit".to_owned(),
            "closed:audit".to_owned(),
        ]
    );
}

#[tokio::test]
async fn unconfirmed_close_fails_and_keeps_connection_open() {
    let broker = Arc::new(FakeBroker {
        close_delay: Some(Duration::from_secs(30)),
        ..FakeBroker::default()
    });
    let observer = Arc::new(RecordingObserver::default());
    let factory = factory(FakeConnector::new(broker.clone()), observer.clone());

    let cfg = ConnectionConfiguration::new().connection_name("slow");
    let conn = factory.new_connection("localhost", 5672, &cfg).await.unwrap();

    let err = conn.close(CloseSpec::WithTimeout(20)).await.unwrap_err();

    assert!(matches!(err, RabbitMqError::ConnectionCloseError(_)));
    assert!(!conn.is_closed());
    assert!(broker.is_open());
    assert!(broker.closes.lock().unwrap().is_empty());

    // abort is the way out, and always ends closed
    conn.abort(CloseSpec::WithTimeout(20)).await;
    assert!(conn.is_closed());

    assert_eq!(
        observer.events(),
        vec![
            "opened:slow".to_owned(),
            "error:connection_close".to_owned(),
            "closed:slow".to_owned(),
        ]
    );
}

#[tokio::test]
async fn shutdown_timeout_bounds_default_close() {
    let broker = Arc::new(FakeBroker {
        close_delay: Some(Duration::from_secs(30)),
        ..FakeBroker::default()
    });
    let observer = Arc::new(RecordingObserver::default());
    let factory = factory(FakeConnector::new(broker), observer);

    let cfg = ConnectionConfiguration::new().shutdown_timeout("0.02".parse().unwrap());
    let conn = factory.new_connection("localhost", 5672, &cfg).await.unwrap();

    let res = tokio::time::timeout(Duration::from_secs(5), conn.close(CloseSpec::Default))
        .await
        .expect("close should be bounded by the shutdown timeout");

    assert!(matches!(res, Err(RabbitMqError::ConnectionCloseError(_))));
    assert!(!conn.is_closed());
}

#[tokio::test]
async fn handshake_timeout_fails_the_connection() {
    let broker = Arc::new(FakeBroker::default());
    let connector = Arc::new(FakeConnector {
        broker: broker.clone(),
        delay: Some(Duration::from_secs(30)),
        seen: Mutex::new(vec![]),
        cancelled: Arc::new(AtomicBool::new(false)),
    });
    let observer = Arc::new(RecordingObserver::default());
    let factory = factory(connector.clone(), observer.clone());

    let cfg = ConnectionConfiguration::new().handshake_timeout(Seconds::from_millis(20));
    let err = factory
        .new_connection("localhost", 5672, &cfg)
        .await
        .unwrap_err();

    assert!(matches!(err, RabbitMqError::ConnectionError(_)));
    assert_eq!(observer.events(), vec!["error:connection".to_owned()]);

    // the pending connect was dropped, nothing was left open
    assert!(connector.cancelled.load(Ordering::SeqCst));
    assert!(connector.seen.lock().unwrap().is_empty());
    assert!(!broker.is_open());
}

#[tokio::test]
async fn secure_socket_switches_to_amqps() {
    let mut ca = tempfile::NamedTempFile::new().unwrap();
    ca.write_all(b"-----BEGIN CERTIFICATE-----\nMIIBAAEC\n-----END CERTIFICATE-----\n")
        .unwrap();

    let broker = Arc::new(FakeBroker::default());
    let connector = FakeConnector::new(broker);
    let observer = Arc::new(RecordingObserver::default());
    let factory = factory(connector.clone(), observer);

    let cfg = ConnectionConfiguration::new()
        .secure_socket(SecureSocket::new(TrustStoreConfig::new(ca.path(), "")));
    factory.new_connection("broker.internal", 5671, &cfg).await.unwrap();

    let seen = connector.seen.lock().unwrap();
    let params = seen.first().unwrap();
    assert_eq!(params.uri.scheme, lapin::uri::AMQPScheme::AMQPS);
    assert!(params.tls.as_ref().unwrap().trust_chain().contains("MIIBAAEC"));
}

#[tokio::test]
async fn missing_truststore_file_reports_connection_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let broker = Arc::new(FakeBroker::default());
    let connector = FakeConnector::new(broker);
    let observer = Arc::new(RecordingObserver::default());
    let factory = factory(connector.clone(), observer.clone());

    let cfg = ConnectionConfiguration::new().secure_socket(SecureSocket::new(
        TrustStoreConfig::new(dir.path().join("ca.pem"), ""),
    ));
    let err = factory
        .new_connection("localhost", 5671, &cfg)
        .await
        .unwrap_err();

    assert!(matches!(err, RabbitMqError::SecureConnectionError(_)));
    assert!(connector.seen.lock().unwrap().is_empty());
    assert_eq!(observer.events(), vec!["error:connection".to_owned()]);
}

#[tokio::test]
async fn json_configuration_drives_the_factory() {
    let broker = Arc::new(FakeBroker::default());
    let connector = FakeConnector::new(broker);
    let observer = Arc::new(RecordingObserver::default());
    let factory = factory(connector.clone(), observer);

    let cfg = ConnectionConfiguration::from_json(
        r#"{ "connection_timeout": 1.005, "heartbeat": 15.7, "virtual_host": "/" }"#,
    )
    .unwrap();
    factory.new_connection("localhost", 5672, &cfg).await.unwrap();

    let seen = connector.seen.lock().unwrap();
    let params = seen.first().unwrap();
    assert_eq!(params.uri.query.connection_timeout, Some(1005));
    assert_eq!(params.uri.query.heartbeat, Some(15));
    assert_eq!(params.uri.vhost, "/");
}

#[tokio::test]
async fn scoped_aborts_when_final_close_is_not_confirmed() {
    let broker = Arc::new(FakeBroker {
        close_delay: Some(Duration::from_secs(30)),
        ..FakeBroker::default()
    });
    let observer = Arc::new(RecordingObserver::default());
    let factory = factory(FakeConnector::new(broker), observer.clone());

    let cfg = ConnectionConfiguration::new()
        .connection_name("scoped")
        .shutdown_timeout(Seconds::from_millis(20));
    let mut used = None;
    let res = factory
        .scoped("localhost", 5672, &cfg, |conn| {
            used = Some(conn.clone());
            async { Ok(()) }
        })
        .await;

    assert!(matches!(res, Err(RabbitMqError::ConnectionCloseError(_))));
    assert!(used.unwrap().is_closed());
    assert_eq!(
        observer.events(),
        vec![
            "opened:scoped".to_owned(),
            "error:connection_close".to_owned(),
            "closed:scoped".to_owned(),
        ]
    );
}
