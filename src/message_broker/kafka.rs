// region:    --- Imports
use super::{EventBus, EventFilter};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

// endregion: --- Imports

// region:    --- Kafka Producer
#[derive(Clone)]
pub struct KafkaProducer {
    producer: Arc<FutureProducer>,
}

/// KafkaProducer 구현
impl KafkaProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(KafkaProducer {
            producer: Arc::new(producer),
        })
    }

    /// 메시지 전송
    pub async fn send_message(&self, topic: &str, key: &str, value: &str) -> Result<(), String> {
        let record = FutureRecord::to(topic).key(key).payload(value);

        self.producer
            .send(record, Duration::from_secs(0))
            .await
            .map_err(|(e, _)| format!("Error sending message: {:?}", e))?;

        Ok(())
    }
}
// endregion: --- Kafka Producer

// region:    --- Kafka Forwarder
/// 이벤트 버스의 모든 이벤트를 Kafka 토픽으로 전달한다.
/// 키는 세션 id (없으면 예약 경매 id) 이므로 같은 세션의 이벤트는 같은 파티션에 순서대로 쌓인다.
pub fn spawn_forwarder(bus: &EventBus, producer: KafkaProducer, topic: String) {
    let mut subscription = bus.subscribe(EventFilter::all());
    info!("{:<12} --> Kafka 포워더 시작: topic={}", "Producer", topic);
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            let key = event
                .session_id()
                .or(event.auction_id())
                .map(|id| id.to_string())
                .unwrap_or_default();
            let payload = match serde_json::to_string(event.as_ref()) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("{:<12} --> 직렬화 오류: {:?}", "Producer", e);
                    continue;
                }
            };
            if let Err(e) = producer.send_message(&topic, &key, &payload).await {
                error!("{:<12} --> Kafka 전송 실패: {}", "Producer", e);
            }
        }
    });
}
// endregion: --- Kafka Forwarder
