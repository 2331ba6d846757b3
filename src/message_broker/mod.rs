// region:    --- Imports
use crate::events::{EventPublisher, NegotiationEvent};
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// endregion: --- Imports

/// 아웃바운드 이벤트 토픽
pub const EVENTS_TOPIC: &str = "negotiation-events";

// region:    --- Kafka Producer
#[derive(Clone)]
pub struct KafkaProducer {
    producer: Arc<FutureProducer>,
}

/// KafkaProducer 구현
impl KafkaProducer {
    pub fn new(brokers: &str) -> Self {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .expect("Producer creation error");

        KafkaProducer {
            producer: Arc::new(producer),
        }
    }

    /// 메시지 전송
    pub async fn send_message(&self, topic: &str, key: &str, value: &str) -> Result<(), String> {
        debug!(
            "{:<12} --> Kafka 메시지 전송: topic={}, key={}",
            "Producer", topic, key
        );
        let record = FutureRecord::to(topic).key(key).payload(value);

        self.producer
            .send(record, std::time::Duration::from_secs(0))
            .await
            .map_err(|(e, _)| format!("Error sending message: {:?}", e))?;

        Ok(())
    }
}
// endregion: --- Kafka Producer

// region:    --- Kafka Event Publisher
/// 협상 이벤트 발행 Kafka 구현체
/// 협상 id를 키로 써서 협상 단위 순서를 보장한다
pub struct KafkaEventPublisher {
    producer: Arc<KafkaProducer>,
}

impl KafkaEventPublisher {
    pub fn new(producer: Arc<KafkaProducer>) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, event: &NegotiationEvent) -> Result<(), String> {
        let payload = serde_json::to_string(event).map_err(|e| e.to_string())?;
        self.producer
            .send_message(EVENTS_TOPIC, &event.key().to_string(), &payload)
            .await
    }
}
// endregion: --- Kafka Event Publisher

// region:    --- Kafka Consumer
pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer>,
}

/// KafkaConsumer 구현
impl KafkaConsumer {
    pub fn new(brokers: &str, group_id: &str) -> Self {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("allow.auto.create.topics", "true")
            .create()
            .expect("Consumer creation failed");

        KafkaConsumer {
            consumer: Arc::new(consumer),
        }
    }

    /// 이벤트 소비 루프
    /// 핸들러 오류는 로그만 남기고 다음 메시지로 넘어간다
    pub async fn consume_events<T, F, Fut>(
        &self,
        topic: &str,
        handler: F,
    ) -> Result<(), Box<dyn std::error::Error>>
    where
        T: DeserializeOwned + std::fmt::Debug,
        F: Fn(T) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), Box<dyn std::error::Error>>> + Send + 'static,
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

                    if let Some(payload) = message.payload() {
                        match serde_json::from_slice::<T>(payload) {
                            Ok(event) => {
                                debug!("{:<12} --> deserialize 성공: {:?}", "Consumer", event);

                                if let Err(e) = handler(event).await {
                                    error!(
                                        "{:<12} --> Kafka 이벤트 처리 오류: {:?}",
                                        "Consumer", e
                                    );
                                }
                            }
                            Err(e) => error!("{:<12} --> deserialize 오류: {:?}", "Consumer", e),
                        }
                    } else {
                        warn!("{:<12} --> 빈 페이로드 수신", "Consumer");
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

impl Default for KafkaManager {
    fn default() -> Self {
        Self::new()
    }
}

/// KafkaManager 구현
impl KafkaManager {
    pub fn new() -> Self {
        let brokers =
            std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string());
        let group_id = "negotiation-events-group".to_string();

        let producer = Arc::new(KafkaProducer::new(&brokers));
        let consumer = Arc::new(KafkaConsumer::new(&brokers, &group_id));

        KafkaManager {
            producer,
            consumer,
            brokers,
        }
    }

    /// 프로듀서 반환
    pub fn get_producer(&self) -> Arc<KafkaProducer> {
        Arc::clone(&self.producer)
    }

    /// 컨슈머 반환
    pub fn get_consumer(&self) -> Arc<KafkaConsumer> {
        Arc::clone(&self.consumer)
    }

    /// 토픽 생성
    pub async fn create_topic(
        &self,
        topic_name: &str,
        num_partitions: i32,
        replication_factor: i32,
    ) -> Result<(), String> {
        info!("{:<12} --> Kafka 토픽 생성 시작: {}", "Manager", topic_name);

        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()
            .map_err(|e| format!("AdminClient 생성 실패: {:?}", e))?;

        let new_topic = NewTopic::new(
            topic_name,
            num_partitions,
            TopicReplication::Fixed(replication_factor),
        );

        match admin_client
            .create_topics(&[new_topic], &AdminOptions::new())
            .await
        {
            Ok(_) => {
                info!("{:<12} --> Kafka 토픽 생성 성공: {}", "Manager", topic_name);
                Ok(())
            }
            Err(e) => {
                error!("{:<12} --> Kafka 토픽 생성 실패: {:?}", "Manager", e);
                Err(format!("토픽 생성 실패: {:?}", e))
            }
        }
    }
}

// endregion: --- Kafka Manager
