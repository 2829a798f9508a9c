//! Router actor: registration, channel negotiation and payload routing

use crate::channel::{ChannelDeclaration, ChannelTable, PublishBinding, SubscriptionBinding};
use crate::error::RouteError;
use crate::stats::RouterStats;
use gateway_bus::{Bus, Delivery};
use gateway_registry::{ClientRegistry, NodeId};
use gateway_transform::TransformRegistry;
use gateway_wire::{
    xor_checksum, Frame, FrameCodec, MessageKind, OutboundFrame, RadioAddress, RawFrame,
    WireError,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Gateway identity size in bytes
pub const IDENTITY_SIZE: usize = 7;

/// Router settings
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Identity announced to nodes
    pub identity: [u8; IDENTITY_SIZE],
    /// Exchange the gateway publishes to and binds on
    pub exchange: String,
    /// Queue receiving messages for subscribed channels
    pub queue: String,
}

impl RouterConfig {
    /// `identity | checksum(identity)`, as nodes expect it in acknowledgements
    pub fn server_id(&self) -> [u8; IDENTITY_SIZE + 1] {
        let mut id = [0u8; IDENTITY_SIZE + 1];
        id[..IDENTITY_SIZE].copy_from_slice(&self.identity);
        id[IDENTITY_SIZE] = xor_checksum(&self.identity);
        id
    }
}

/// Single owner of node, channel and transform state
pub struct Router {
    config: RouterConfig,
    codec: FrameCodec,
    clients: ClientRegistry,
    transforms: TransformRegistry,
    channels: ChannelTable,
    bus: Arc<dyn Bus>,
    /// Queue of frames for the radio transmitter
    outbound_tx: Option<mpsc::Sender<OutboundFrame>>,
    stats: RouterStats,
}

impl Router {
    /// Create a router with an empty registry
    pub fn new(
        config: RouterConfig,
        codec: FrameCodec,
        transforms: TransformRegistry,
        bus: Arc<dyn Bus>,
    ) -> Self {
        Self {
            config,
            codec,
            clients: ClientRegistry::new(),
            transforms,
            channels: ChannelTable::new(),
            bus,
            outbound_tx: None,
            stats: RouterStats::new(),
        }
    }

    /// Attach the radio transmitter queue
    pub fn set_outbound_sender(&mut self, tx: mpsc::Sender<OutboundFrame>) {
        self.outbound_tx = Some(tx);
    }

    /// Client registry
    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Channel tables
    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    /// Counters so far
    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    /// Declare the exchange and the inbound queue and start consuming
    pub async fn attach_bus(
        &self,
        deliveries: mpsc::UnboundedSender<Delivery>,
    ) -> Result<(), RouteError> {
        self.bus.declare_topic_exchange(&self.config.exchange).await?;
        self.bus.declare_queue(&self.config.queue, true).await?;
        self.bus.consume(&self.config.queue, deliveries).await?;
        info!(
            "Consuming {} on exchange {}",
            self.config.queue, self.config.exchange
        );
        Ok(())
    }

    /// Route frames and deliveries until shutdown or until both producers stop
    pub async fn run(
        mut self,
        mut frames: mpsc::Receiver<RawFrame>,
        mut deliveries: mpsc::UnboundedReceiver<Delivery>,
        mut shutdown: watch::Receiver<bool>,
    ) -> RouterStats {
        info!("Router started");

        loop {
            tokio::select! {
                Some(raw) = frames.recv() => {
                    if let Err(e) = self.handle_frame(&raw).await {
                        self.report(e);
                    }
                }

                Some(delivery) = deliveries.recv() => {
                    self.handle_delivery(delivery).await;
                }

                _ = shutdown.changed() => {
                    info!("Router shutting down");
                    break;
                }

                else => {
                    info!("Router producers closed");
                    break;
                }
            }
        }

        self.stats
    }

    /// Decrypt one frame and dispatch it by message kind
    pub async fn handle_frame(&mut self, raw: &RawFrame) -> Result<(), RouteError> {
        self.stats.frames_received += 1;
        let frame = self.codec.decode(raw)?;
        debug!(
            "Received {} from node {} (counter {})",
            frame.kind.as_str(),
            frame.node_id,
            frame.counter
        );

        match frame.kind {
            MessageKind::Register => self.handle_register(&frame).await?,
            MessageKind::PubChannel => {
                self.clients.check(frame.node_id, frame.counter)?;
                self.handle_pub_channel(&frame)?;
            }
            MessageKind::SubChannel => {
                self.clients.check(frame.node_id, frame.counter)?;
                self.handle_sub_channel(&frame).await?;
            }
            MessageKind::Pub => {
                self.clients.check(frame.node_id, frame.counter)?;
                self.handle_pub(&frame).await?;
            }
            MessageKind::RegisterServerAck => {
                return Err(RouteError::UnexpectedKind {
                    node_id: frame.node_id,
                    kind: frame.kind,
                })
            }
        }

        self.stats.frames_dispatched += 1;
        Ok(())
    }

    /// REGISTER: resolve the node, start a fresh session, acknowledge
    async fn handle_register(&mut self, frame: &Frame) -> Result<(), RouteError> {
        let address = RadioAddress::from_registration(&frame.payload)?;
        let registration = self.clients.resolve_or_register(address, frame.counter)?;
        let node_id = registration.node_id;

        if !registration.created {
            self.clients.restart_session(node_id, frame.counter)?;
        }
        self.clients.check(node_id, frame.counter)?;

        let (published, subscribed) = self.channels.clear_node(node_id);
        self.stats.registrations += 1;
        info!(
            "Node {} registered from {} ({} publish / {} subscription channels cleared)",
            node_id, address, published, subscribed
        );

        let mut payload = Vec::with_capacity(1 + IDENTITY_SIZE + 1);
        payload.push(node_id);
        payload.extend_from_slice(&self.config.server_id());
        self.send_to_node(node_id, MessageKind::RegisterServerAck, &payload)
            .await
    }

    /// PUB_CHANNEL: bind a node channel to a routing key
    fn handle_pub_channel(&mut self, frame: &Frame) -> Result<(), RouteError> {
        let decl = ChannelDeclaration::parse(&frame.payload)?;
        let transform = self.transforms.resolve(decl.transform_id)?;

        info!(
            "Node {} publishes channel {} on {} ({})",
            frame.node_id, decl.channel_id, decl.routing_key, transform
        );
        self.channels.bind_publish(
            frame.node_id,
            decl.channel_id,
            PublishBinding {
                routing_key: decl.routing_key,
                transform,
            },
        );
        Ok(())
    }

    /// SUB_CHANNEL: subscribe a node channel and bind the key on the bus
    async fn handle_sub_channel(&mut self, frame: &Frame) -> Result<(), RouteError> {
        let decl = ChannelDeclaration::parse(&frame.payload)?;
        let transform = self.transforms.resolve(decl.transform_id)?;

        self.bus
            .bind(&self.config.queue, &self.config.exchange, &decl.routing_key)
            .await?;

        info!(
            "Node {} subscribes channel {} to {} ({})",
            frame.node_id, decl.channel_id, decl.routing_key, transform
        );
        self.channels.bind_subscription(
            &decl.routing_key,
            SubscriptionBinding {
                node_id: frame.node_id,
                channel_id: decl.channel_id,
                transform,
            },
        );
        Ok(())
    }

    /// PUB: decode a channel payload and publish it
    async fn handle_pub(&mut self, frame: &Frame) -> Result<(), RouteError> {
        let (&channel_id, data) = frame
            .payload
            .split_first()
            .ok_or(WireError::Malformed("pub payload without channel id"))?;

        let binding = self.channels.publish_binding(frame.node_id, channel_id)?;
        let message = binding.transform.decode(data)?;
        let routing_key = binding.routing_key.clone();

        self.bus
            .publish(&self.config.exchange, &routing_key, &message)
            .await?;
        self.stats.messages_published += 1;
        debug!(
            "Published node {} channel {} on {}: {}",
            frame.node_id, channel_id, routing_key, message
        );
        Ok(())
    }

    /// Fan a bus message out to every subscribed node channel.
    ///
    /// Each binding is tried on its own; a failure skips only that binding.
    /// Returns the number of frames queued.
    pub async fn handle_delivery(&mut self, delivery: Delivery) -> usize {
        self.stats.deliveries_received += 1;
        let subscribers = self.channels.subscribers_for(&delivery.routing_key);
        if subscribers.is_empty() {
            debug!("No subscribers for {}", delivery.routing_key);
            return 0;
        }

        let mut sent = 0;
        for subscriber in subscribers {
            match self.forward(&subscriber, &delivery).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    debug!(
                        "Skipping node {} channel {} for {}",
                        subscriber.node_id, subscriber.channel_id, delivery.routing_key
                    );
                    self.report(e);
                }
            }
        }
        sent
    }

    async fn forward(
        &mut self,
        subscriber: &SubscriptionBinding,
        delivery: &Delivery,
    ) -> Result<(), RouteError> {
        let data = subscriber.transform.encode(&delivery.message)?;
        let mut payload = Vec::with_capacity(1 + data.len());
        payload.push(subscriber.channel_id);
        payload.extend_from_slice(&data);
        self.send_to_node(subscriber.node_id, MessageKind::Pub, &payload)
            .await
    }

    /// Encrypt a frame for a node and queue it for the transmitter
    async fn send_to_node(
        &mut self,
        node_id: NodeId,
        kind: MessageKind,
        payload: &[u8],
    ) -> Result<(), RouteError> {
        let Some(tx) = self.outbound_tx.as_ref() else {
            debug!("No transmitter attached, not sending {}", kind.as_str());
            return Ok(());
        };

        let address = self
            .clients
            .address_of(node_id)
            .ok_or(gateway_registry::RegistryError::UnknownNode(node_id))?;
        let counter = self.clients.next_outbound_counter(node_id)?;
        let frame = self.codec.encode(counter, kind, payload)?;

        if tx
            .send(OutboundFrame {
                node_id,
                address,
                kind,
                frame,
            })
            .await
            .is_err()
        {
            warn!("Transmitter gone, dropping {} for node {}", kind.as_str(), node_id);
            return Ok(());
        }

        self.stats.frames_queued += 1;
        Ok(())
    }

    fn report(&mut self, err: RouteError) {
        self.stats.record_drop(err.reason());
        if err.is_fatal() {
            error!("Cannot onboard node: {}", err);
        } else if err.is_silent() {
            debug!("Dropped frame: {}", err);
        } else {
            warn!("Dropped: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_bus::MemoryBus;
    use gateway_wire::KEY_SIZE;
    use serde_json::json;

    const KEY: [u8; KEY_SIZE] = [
        25, 123, 90, 174, 198, 145, 40, 33, 98, 90, 90, 111, 78, 65, 184, 188,
    ];
    const IDENTITY: [u8; IDENTITY_SIZE] = [1, 2, 3, 4, 5, 6, 7];
    const NODE_ADDRESS: RadioAddress = RadioAddress::new([0xF0, 0xF0, 0xF0, 0xF0, 0xD2]);

    struct Harness {
        router: Router,
        bus: MemoryBus,
        codec: FrameCodec,
        outbound_rx: mpsc::Receiver<OutboundFrame>,
        published_rx: mpsc::UnboundedReceiver<Delivery>,
        _deliveries: mpsc::UnboundedReceiver<Delivery>,
    }

    /// Router on a memory bus, plus a second queue observing every publish
    async fn harness() -> Harness {
        let bus = MemoryBus::new();
        let config = RouterConfig {
            identity: IDENTITY,
            exchange: "gateway.exchange".to_string(),
            queue: "gateway.queue".to_string(),
        };
        let mut router = Router::new(
            config,
            FrameCodec::new(&KEY),
            TransformRegistry::with_builtins(),
            Arc::new(bus.clone()),
        );
        let (outbound_tx, outbound_rx) = mpsc::channel(16);
        router.set_outbound_sender(outbound_tx);

        let (delivery_tx, deliveries) = mpsc::unbounded_channel();
        router.attach_bus(delivery_tx).await.unwrap();

        bus.declare_queue("observer", false).await.unwrap();
        bus.bind("observer", "gateway.exchange", "#").await.unwrap();
        let (published_tx, published_rx) = mpsc::unbounded_channel();
        bus.consume("observer", published_tx).await.unwrap();

        Harness {
            router,
            bus,
            codec: FrameCodec::new(&KEY),
            outbound_rx,
            published_rx,
            _deliveries: deliveries,
        }
    }

    impl Harness {
        fn frame(
            &self,
            counter: u16,
            node_id: NodeId,
            kind: MessageKind,
            payload: &[u8],
        ) -> RawFrame {
            self.codec
                .encode_frame(&Frame::new(counter, node_id, kind, payload))
                .unwrap()
        }

        async fn register(&mut self, address: RadioAddress, counter: u16) -> NodeId {
            let mut payload = address.to_registration().to_vec();
            payload.extend_from_slice(&[0, 0, 0]);
            let raw = self.frame(counter, 0, MessageKind::Register, &payload);
            self.router.handle_frame(&raw).await.unwrap();
            let ack = self.outbound_rx.try_recv().unwrap();
            self.codec.decode(&ack.frame).unwrap().payload[0]
        }

        async fn declare(
            &mut self,
            kind: MessageKind,
            counter: u16,
            node_id: NodeId,
            decl: &ChannelDeclaration,
        ) -> Result<(), RouteError> {
            let raw = self.frame(counter, node_id, kind, &decl.to_payload());
            self.router.handle_frame(&raw).await
        }
    }

    fn decl(channel_id: u8, transform_id: u8, key: &str) -> ChannelDeclaration {
        ChannelDeclaration {
            channel_id,
            transform_id,
            routing_key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_fresh_node_gets_id_one_and_ack() {
        let mut h = harness().await;
        let mut payload = NODE_ADDRESS.to_registration().to_vec();
        payload.extend_from_slice(&[0, 0, 0]);
        let raw = h.frame(50, 0, MessageKind::Register, &payload);
        h.router.handle_frame(&raw).await.unwrap();

        let ack = h.outbound_rx.try_recv().unwrap();
        assert_eq!(ack.node_id, 1);
        assert_eq!(ack.address, NODE_ADDRESS);
        assert_eq!(ack.kind, MessageKind::RegisterServerAck);

        let frame = h.codec.decode(&ack.frame).unwrap();
        assert_eq!(frame.kind, MessageKind::RegisterServerAck);
        assert_eq!(frame.node_id, 0);
        assert_eq!(frame.payload.len(), 9);
        assert_eq!(frame.payload[0], 1);
        assert_eq!(&frame.payload[1..8], &IDENTITY);
        assert_eq!(frame.payload[8], xor_checksum(&IDENTITY));
        assert_eq!(frame.payload[8], 121);

        // The registration counter is consumed
        let client = h.router.clients().get(1).unwrap();
        assert_eq!(client.inbound_counter, 50);
        assert_eq!(h.router.channels().publish_count(1), 0);
        assert_eq!(h.router.stats().registrations, 1);
        assert_eq!(h.router.stats().frames_queued, 1);
    }

    #[tokio::test]
    async fn test_ack_counters_advance() {
        let mut h = harness().await;
        let first = h.register(NODE_ADDRESS, 10).await;
        let counter = h.router.clients().get(first).unwrap().outbound_counter;

        let raw = h.frame(
            11,
            first,
            MessageKind::SubChannel,
            &decl(0, 0, "kitchen.light").to_payload(),
        );
        h.router.handle_frame(&raw).await.unwrap();
        h.router
            .handle_delivery(Delivery {
                exchange: "gateway.exchange".to_string(),
                routing_key: "kitchen.light".to_string(),
                message: json!({"status": true}),
            })
            .await;

        let out = h.outbound_rx.try_recv().unwrap();
        let frame = h.codec.decode(&out.frame).unwrap();
        assert_eq!(frame.counter, counter);
        assert_eq!(
            h.router.clients().get(first).unwrap().outbound_counter,
            counter.wrapping_add(1)
        );
    }

    #[tokio::test]
    async fn test_reregistration_keeps_id_and_clears_channels() {
        let mut h = harness().await;
        let node = h.register(NODE_ADDRESS, 100).await;
        assert_eq!(node, 1);

        h.declare(MessageKind::PubChannel, 101, node, &decl(0, 1, "attic.climate"))
            .await
            .unwrap();
        h.declare(MessageKind::SubChannel, 102, node, &decl(1, 0, "attic.fan"))
            .await
            .unwrap();
        assert_eq!(h.router.channels().publish_count(node), 1);
        assert_eq!(h.router.channels().subscription_count(node), 1);

        // Rebooted node comes back with a fresh random counter
        let again = h.register(NODE_ADDRESS, 7).await;
        assert_eq!(again, node);
        assert_eq!(h.router.clients().len(), 1);
        assert_eq!(h.router.channels().publish_count(node), 0);
        assert_eq!(h.router.channels().subscription_count(node), 0);

        // The new session's counters apply
        h.declare(MessageKind::PubChannel, 8, node, &decl(0, 1, "attic.climate"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_repeated_register_reopens_counter_window() {
        let mut h = harness().await;
        let mut payload = NODE_ADDRESS.to_registration().to_vec();
        payload.extend_from_slice(&[0, 0, 0]);
        let register = h.frame(100, 0, MessageKind::Register, &payload);
        h.router.handle_frame(&register).await.unwrap();
        h.outbound_rx.try_recv().unwrap();

        let early = h.frame(101, 1, MessageKind::PubChannel, &decl(0, 0, "a").to_payload());
        let late = h.frame(110, 1, MessageKind::PubChannel, &decl(1, 0, "b").to_payload());
        h.router.handle_frame(&early).await.unwrap();
        h.router.handle_frame(&late).await.unwrap();
        assert!(h.router.handle_frame(&early).await.is_err());

        // The same REGISTER bytes start a new session at counter 100
        h.router.handle_frame(&register).await.unwrap();
        h.outbound_rx.try_recv().unwrap();
        assert_eq!(h.router.clients().get(1).unwrap().inbound_counter, 100);
        h.router.handle_frame(&early).await.unwrap();
        assert_eq!(h.router.channels().publish_count(1), 1);
        assert_eq!(h.router.stats().registrations, 2);
    }

    #[tokio::test]
    async fn test_second_address_gets_next_id() {
        let mut h = harness().await;
        assert_eq!(h.register(NODE_ADDRESS, 1).await, 1);
        assert_eq!(
            h.register(RadioAddress::new([0xF0, 0xF0, 0xF0, 0xF0, 0xD3]), 1)
                .await,
            2
        );
    }

    #[tokio::test]
    async fn test_pub_publishes_on_bound_key() {
        let mut h = harness().await;
        let node = h.register(NODE_ADDRESS, 1).await;
        h.declare(MessageKind::PubChannel, 2, node, &decl(3, 1, "attic.climate"))
            .await
            .unwrap();

        let raw = h.frame(
            3,
            node,
            MessageKind::Pub,
            &[3, 0, 0, 188, 65, 0, 0, 113, 66],
        );
        h.router.handle_frame(&raw).await.unwrap();

        let published = h.published_rx.try_recv().unwrap();
        assert_eq!(published.routing_key, "attic.climate");
        assert_eq!(
            published.message,
            json!({"temperature": 23.5, "humidity": 60.25})
        );
        assert_eq!(h.router.stats().messages_published, 1);
    }

    #[tokio::test]
    async fn test_pub_without_channel_is_dropped() {
        let mut h = harness().await;
        let node = h.register(NODE_ADDRESS, 1).await;

        let raw = h.frame(2, node, MessageKind::Pub, &[0, 1]);
        assert!(matches!(
            h.router.handle_frame(&raw).await,
            Err(RouteError::NoChannels(1))
        ));

        h.declare(MessageKind::PubChannel, 3, node, &decl(0, 0, "hall.switch"))
            .await
            .unwrap();
        let raw = h.frame(4, node, MessageKind::Pub, &[5, 1]);
        assert!(matches!(
            h.router.handle_frame(&raw).await,
            Err(RouteError::NoChannel {
                node_id: 1,
                channel_id: 5
            })
        ));
        assert!(h.published_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_transform_is_rejected() {
        let mut h = harness().await;
        let node = h.register(NODE_ADDRESS, 1).await;

        let result = h
            .declare(MessageKind::PubChannel, 2, node, &decl(0, 9, "a.b"))
            .await;
        assert!(matches!(
            result,
            Err(RouteError::Transform(
                gateway_transform::TransformError::UnknownTransform(9)
            ))
        ));
        let result = h
            .declare(MessageKind::SubChannel, 3, node, &decl(0, 9, "a.b"))
            .await;
        assert!(result.is_err());

        assert_eq!(h.router.channels().publish_count(node), 0);
        assert_eq!(h.router.channels().subscription_count(node), 0);
        assert!(h.bus.bindings("gateway.queue").is_empty());
    }

    #[tokio::test]
    async fn test_replayed_frame_is_rejected() {
        let mut h = harness().await;
        let node = h.register(NODE_ADDRESS, 1).await;
        let raw = h.frame(2, node, MessageKind::PubChannel, &decl(0, 0, "a").to_payload());

        h.router.handle_frame(&raw).await.unwrap();
        assert!(matches!(
            h.router.handle_frame(&raw).await,
            Err(RouteError::Registry(
                gateway_registry::RegistryError::ReplayRejected { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_frames_from_unknown_node_are_dropped() {
        let mut h = harness().await;
        let raw = h.frame(2, 4, MessageKind::Pub, &[0, 1]);
        let err = h.router.handle_frame(&raw).await.unwrap_err();
        assert_eq!(err.reason(), "unknown_node");
    }

    #[tokio::test]
    async fn test_short_register_payload_is_malformed() {
        let mut h = harness().await;
        let raw = h.frame(1, 0, MessageKind::Register, &[1, 2, 3]);
        let err = h.router.handle_frame(&raw).await.unwrap_err();
        assert_eq!(err.reason(), "malformed_frame");
        assert!(h.router.clients().is_empty());
        assert!(h.outbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_delivery_fans_out_to_subscribers() {
        let mut h = harness().await;
        let first = h.register(NODE_ADDRESS, 1).await;
        let second = h
            .register(RadioAddress::new([0xF0, 0xF0, 0xF0, 0xF0, 0xD3]), 1)
            .await;

        h.declare(MessageKind::SubChannel, 2, first, &decl(2, 0, "hall.*"))
            .await
            .unwrap();
        h.declare(MessageKind::SubChannel, 2, second, &decl(0, 0, "hall.light"))
            .await
            .unwrap();
        assert_eq!(h.bus.bindings("gateway.queue").len(), 2);

        let sent = h
            .router
            .handle_delivery(Delivery {
                exchange: "gateway.exchange".to_string(),
                routing_key: "hall.light".to_string(),
                message: json!({"status": true}),
            })
            .await;
        assert_eq!(sent, 2);

        let mut frames = Vec::new();
        while let Ok(out) = h.outbound_rx.try_recv() {
            let frame = h.codec.decode(&out.frame).unwrap();
            assert_eq!(frame.kind, MessageKind::Pub);
            assert_eq!(frame.node_id, 0);
            frames.push((out.node_id, frame.payload));
        }
        frames.sort();
        assert_eq!(frames, vec![(first, vec![2, 1]), (second, vec![0, 1])]);
    }

    #[tokio::test]
    async fn test_unfit_delivery_skips_only_that_binding() {
        let mut h = harness().await;
        let first = h.register(NODE_ADDRESS, 1).await;
        let second = h
            .register(RadioAddress::new([0xF0, 0xF0, 0xF0, 0xF0, 0xD3]), 1)
            .await;

        h.declare(MessageKind::SubChannel, 2, first, &decl(0, 0, "hall.light"))
            .await
            .unwrap();
        h.declare(MessageKind::SubChannel, 2, second, &decl(0, 1, "hall.light"))
            .await
            .unwrap();

        let sent = h
            .router
            .handle_delivery(Delivery {
                exchange: "gateway.exchange".to_string(),
                routing_key: "hall.light".to_string(),
                message: json!({"temperature": 20.5, "humidity": 40.0}),
            })
            .await;
        assert_eq!(sent, 1);
        assert_eq!(h.outbound_rx.try_recv().unwrap().node_id, second);
        assert_eq!(h.router.stats().drops("transform_message"), 1);
    }

    #[tokio::test]
    async fn test_run_routes_until_shutdown() {
        let h = harness().await;
        let Harness {
            router,
            codec,
            mut outbound_rx,
            ..
        } = h;

        let (frame_tx, frame_rx) = mpsc::channel(8);
        let (_delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(router.run(frame_rx, delivery_rx, shutdown_rx));

        // Garbage does not stop the loop
        frame_tx.send([0u8; 32]).await.unwrap();
        let mut payload = NODE_ADDRESS.to_registration().to_vec();
        payload.extend_from_slice(&[0, 0, 0]);
        let raw = codec
            .encode_frame(&Frame::new(9, 0, MessageKind::Register, payload))
            .unwrap();
        frame_tx.send(raw).await.unwrap();

        let ack = outbound_rx.recv().await.unwrap();
        assert_eq!(ack.kind, MessageKind::RegisterServerAck);

        shutdown_tx.send(true).unwrap();
        let stats = handle.await.unwrap();
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.registrations, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_server_id() {
        let config = RouterConfig {
            identity: IDENTITY,
            exchange: String::new(),
            queue: String::new(),
        };
        assert_eq!(config.server_id(), [1, 2, 3, 4, 5, 6, 7, 121]);
    }
}
