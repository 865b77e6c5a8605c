// region:    --- Imports
use crate::config::Config;
use crate::event_store::{Event, EventPublisher};
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time;
use tracing::{debug, error, info, warn};

// endregion: --- Imports

const INIT_TOPIC: &str = "auction-init";
const INIT_MESSAGE: &[u8] = b"init-message";

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

// region:    --- Broker Error
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Kafka 오류: {0}")]
    Kafka(#[from] KafkaError),

    #[error("Kafka 초기화 메시지 수신 실패")]
    InitTimeout,

    #[error("토픽 생성 실패: {0}")]
    Topic(String),

    #[error("이벤트 직렬화 오류: {0}")]
    Serialization(#[from] serde_json::Error),
}
// endregion: --- Broker Error

// region:    --- Kafka Producer
#[derive(Clone)]
pub struct KafkaProducer {
    producer: Arc<FutureProducer>,
}

/// KafkaProducer 구현
impl KafkaProducer {
    pub fn new(brokers: &str) -> Result<Self, BrokerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(KafkaProducer {
            producer: Arc::new(producer),
        })
    }

    /// 메시지 전송 (키 = 경매 id, 같은 파티션으로 순서 보장)
    pub async fn send_message(
        &self,
        topic: &str,
        key: &str,
        value: &str,
    ) -> Result<(), BrokerError> {
        debug!(
            "{:<12} --> Kafka 메시지 전송: topic={}, key={}",
            "Producer", topic, key
        );
        let record = FutureRecord::to(topic).key(key).payload(value);

        self.producer
            .send(record, Duration::from_secs(0))
            .await
            .map_err(|(e, _)| BrokerError::Kafka(e))?;

        Ok(())
    }

    /// 저장된 이벤트 발행, 키는 경매 id
    pub async fn publish_event(&self, topic: &str, event: &Event) -> Result<(), BrokerError> {
        let payload = serde_json::to_string(event)?;
        self.send_message(topic, &event.aggregate_id.to_string(), &payload)
            .await
    }
}

/// 저장된 이벤트를 이벤트 토픽으로 발행
pub struct KafkaEventPublisher {
    producer: Arc<KafkaProducer>,
    topic: String,
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, event: &Event) -> Result<(), BrokerError> {
        self.producer.publish_event(&self.topic, event).await
    }
}

// endregion: --- Kafka Producer

// region:    --- Retry Policy
/// 핸들러 실패 시 재시도 간격 (지수 증가, 상한 있음)
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// attempt 번째 실패 후 대기 시간 (1부터)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// 성공할 때까지 핸들러 호출, 호출 횟수 반환
    pub async fn deliver<F, Fut>(&self, handler: &F, event: &Event) -> u32
    where
        F: Fn(Event) -> Fut,
        Fut: std::future::Future<Output = Result<(), HandlerError>>,
    {
        let mut attempt = 1;
        loop {
            match handler(event.clone()).await {
                Ok(()) => return attempt,
                Err(e) => {
                    let delay = self.delay(attempt);
                    error!(
                        "{:<12} --> 이벤트 처리 실패 (aggregate={}, version={}, 시도 {}), {:?} 후 재시도: {:?}",
                        "Consumer", event.aggregate_id, event.version, attempt, delay, e
                    );
                    time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
// endregion: --- Retry Policy

// region:    --- Kafka Consumer
pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer>,
    retry: RetryPolicy,
}

/// KafkaConsumer 구현
impl KafkaConsumer {
    pub fn new(brokers: &str, group_id: &str) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("allow.auto.create.topics", "true")
            .create()?;

        Ok(KafkaConsumer {
            consumer: Arc::new(consumer),
            retry: RetryPolicy::default(),
        })
    }

    /// 이벤트 소비 루프
    /// 핸들러가 성공한 뒤에만 오프셋을 커밋한다. 실패한 이벤트는 성공할 때까지 재시도하므로
    /// 같은 파티션의 뒤 이벤트는 기다린다.
    pub async fn consume_events<F, Fut>(&self, topic: &str, handler: F) -> Result<(), BrokerError>
    where
        F: Fn(Event) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        info!(
            "{:<12} --> Kafka 이벤트 소비 시작: topic={}",
            "Consumer", topic
        );
        self.consumer.subscribe(&[topic])?;

        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    debug!(
                        "{:<12} --> 메시지 수신: topic={}, partition={}, offset={}",
                        "Consumer",
                        message.topic(),
                        message.partition(),
                        message.offset()
                    );

                    match message.payload().map(serde_json::from_slice::<Event>) {
                        Some(Ok(event)) => {
                            let attempts = self.retry.deliver(&handler, &event).await;
                            if attempts > 1 {
                                info!(
                                    "{:<12} --> 재시도 후 처리 완료 (aggregate={}, version={}, 시도 {})",
                                    "Consumer", event.aggregate_id, event.version, attempts
                                );
                            }
                        }
                        // 해석할 수 없는 메시지는 다시 받아도 같으므로 커밋
                        Some(Err(e)) => error!("{:<12} --> deserialize 오류: {:?}", "Consumer", e),
                        None => warn!("{:<12} --> 빈 페이로드 수신", "Consumer"),
                    }

                    if let Err(e) = self.consumer.commit_message(&message, CommitMode::Async) {
                        warn!("{:<12} --> 오프셋 커밋 실패: {:?}", "Consumer", e);
                    }
                }
                Err(e) => error!("{:<12} --> 메시지 수신 오류: {:?}", "Consumer", e),
            }
        }
    }
}

// endregion: --- Kafka Consumer

// region:    --- Kafka Manager
pub struct KafkaManager {
    producer: Arc<KafkaProducer>,
    consumer: Arc<KafkaConsumer>,
    brokers: String,
}

/// KafkaManager 구현
impl KafkaManager {
    pub fn new(config: &Config) -> Result<Self, BrokerError> {
        let producer = Arc::new(KafkaProducer::new(&config.kafka_brokers)?);
        let consumer = Arc::new(KafkaConsumer::new(
            &config.kafka_brokers,
            &config.kafka_group_id,
        )?);

        Ok(KafkaManager {
            producer,
            consumer,
            brokers: config.kafka_brokers.clone(),
        })
    }

    /// 이벤트 토픽 발행자
    pub fn event_publisher(&self, topic: &str) -> KafkaEventPublisher {
        KafkaEventPublisher {
            producer: Arc::clone(&self.producer),
            topic: topic.to_string(),
        }
    }

    /// 컨슈머 반환
    pub fn get_consumer(&self) -> Arc<KafkaConsumer> {
        Arc::clone(&self.consumer)
    }

    /// Kafka 초기화: 초기화 토픽으로 메시지를 주고받아 연결 확인
    pub async fn initialize(&self) -> Result<(), BrokerError> {
        info!("{:<12} --> Kafka 초기화 시작", "Manager");

        self.consumer.consumer.subscribe(&[INIT_TOPIC])?;
        self.producer
            .send_message(INIT_TOPIC, "init-key", "init-message")
            .await?;

        let max_attempts = 10;
        let mut attempts = 0;
        while attempts < max_attempts {
            match time::timeout(Duration::from_secs(1), self.consumer.consumer.recv()).await {
                Ok(Ok(message)) => {
                    if message.payload() == Some(INIT_MESSAGE) {
                        info!("{:<12} --> Kafka 초기화 메시지 수신 확인", "Manager");
                        self.consumer.consumer.unsubscribe();
                        return Ok(());
                    }
                }
                Ok(Err(e)) => error!(
                    "{:<12} --> Kafka 초기화 메시지 수신 오류: {:?}",
                    "Manager", e
                ),
                Err(_) => {
                    attempts += 1;
                    warn!(
                        "{:<12} --> Kafka 초기화 메시지 수신 대기 중... (시도: {}/{})",
                        "Manager", attempts, max_attempts
                    );
                }
            }
        }

        Err(BrokerError::InitTimeout)
    }

    /// 토픽 생성
    pub async fn create_topic(
        &self,
        topic_name: &str,
        num_partitions: i32,
        replication_factor: i32,
    ) -> Result<(), BrokerError> {
        info!("{:<12} --> Kafka 토픽 생성 시작: {}", "Manager", topic_name);

        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()?;

        let new_topic = NewTopic::new(
            topic_name,
            num_partitions,
            TopicReplication::Fixed(replication_factor),
        );

        let results = admin_client
            .create_topics(&[new_topic], &AdminOptions::new())
            .await?;

        for result in results {
            match result {
                Ok(topic) => info!("{:<12} --> Kafka 토픽 생성 성공: {}", "Manager", topic),
                // 이미 존재하는 토픽은 정상
                Err((topic, rdkafka::types::RDKafkaErrorCode::TopicAlreadyExists)) => {
                    info!("{:<12} --> Kafka 토픽 이미 존재: {}", "Manager", topic)
                }
                Err((topic, code)) => {
                    return Err(BrokerError::Topic(format!("{topic}: {code:?}")));
                }
            }
        }
        Ok(())
    }
}

// endregion: --- Kafka Manager
