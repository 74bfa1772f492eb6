use uuid::Uuid;

/// The minimal shape the engine and transfer sender need to know about a
/// broker. Session/PIN/RSA credential material is out of scope; a `Broker`
/// here is an opaque handle passed to `TransferSender::send`, not the
/// credential itself.
#[derive(Debug, Clone)]
pub struct Broker {
    pub id: Uuid,
    pub label: String,
}
