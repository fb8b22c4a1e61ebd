use scs_exchange::packet::{ACK_PACKET_TAG, DATA_PACKET_TAG};
use scs_exchange::transmitter::OutputState;
use scs_exchange::{
    AckPacket, DataExchange, DataPacket, ExchangeConfig, ManualClock, MemoryPort, PacketId,
    SimPort, SimulatedLink, SimulatorConfig, MAX_PAYLOAD_SIZE,
};

type SimExchange = DataExchange<SimPort, ManualClock>;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Host and device engines joined by a simulated line, sharing one clock.
struct Harness {
    host: SimExchange,
    device: SimExchange,
    clock: ManualClock,
    received: Vec<u8>,
}

impl Harness {
    fn new(sim: SimulatorConfig) -> Self {
        Self::with_configs(sim, ExchangeConfig::default(), ExchangeConfig::default())
    }

    fn with_configs(sim: SimulatorConfig, host: ExchangeConfig, device: ExchangeConfig) -> Self {
        init_logging();
        let clock = ManualClock::new();
        let (a, b) = SimulatedLink::pair(sim);
        Self {
            host: DataExchange::new(a, clock.clone(), host).unwrap(),
            device: DataExchange::new(b, clock.clone(), device).unwrap(),
            clock,
            received: Vec::new(),
        }
    }

    /// One poll on each side, then one millisecond passes.
    fn step(&mut self) {
        self.host.poll();
        self.device.poll();
        let pending = self.device.inbound_len();
        self.received.extend(self.device.take_inbound(pending));
        self.clock.advance(1);
    }

    fn run_until(&mut self, max_steps: usize, mut done: impl FnMut(&mut Self) -> bool) -> bool {
        for _ in 0..max_steps {
            if done(self) {
                return true;
            }
            self.step();
        }
        done(self)
    }

    fn run(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step();
        }
    }

    /// Data packet IDs the host put on the line, retransmissions included.
    fn host_data_ids(&self) -> Vec<u8> {
        self.host
            .transport()
            .sent_chunks()
            .iter()
            .filter(|chunk| chunk.first() == Some(&DATA_PACKET_TAG))
            .map(|chunk| chunk[1])
            .collect()
    }
}

fn memory_exchange(config: ExchangeConfig) -> DataExchange<MemoryPort, ManualClock> {
    DataExchange::new(MemoryPort::new(), ManualClock::new(), config).unwrap()
}

fn feed(exchange: &mut DataExchange<MemoryPort, ManualClock>, bytes: &[u8]) {
    exchange.transport_mut().push_received(bytes);
    exchange.poll_n(bytes.len() + 1);
}

#[test]
fn test_round_trip_every_payload_size() {
    let mut harness = Harness::new(SimulatorConfig::lossless());

    for size in 1..=MAX_PAYLOAD_SIZE {
        let payload: Vec<u8> = (0..size).map(|i| (i * 7 + size) as u8).collect();
        harness.received.clear();
        harness.host.submit_outbound(&payload).unwrap();

        assert!(harness.run_until(1_000, |h| h.received.len() >= size && h.host.is_idle()));
        assert_eq!(harness.received, payload, "payload of {} bytes", size);
    }

    assert_eq!(harness.host.stats().retransmissions, 0);
    assert_eq!(harness.device.stats().data_accepted, MAX_PAYLOAD_SIZE as u64);
    println!("✓ Round trip verified for payloads 1..={}", MAX_PAYLOAD_SIZE);
}

#[test]
fn test_lost_ack_causes_duplicate_and_reack() {
    let mut harness = Harness::new(SimulatorConfig::lossless().drop_b_to_a(0));
    harness.host.submit_outbound(b"MOVE A 100\n").unwrap();

    assert!(harness.run_until(2_000, |h| h.host.is_idle()));
    assert_eq!(harness.received, b"MOVE A 100\n");

    let device = harness.device.stats();
    assert_eq!(device.data_accepted, 1);
    assert_eq!(device.duplicates, 1);
    assert_eq!(device.acks_sent, 2);
    assert_eq!(harness.host.stats().retransmissions, 1);
    println!("✓ Duplicate discarded and acknowledged again");
}

#[test]
fn test_retransmits_identical_packet_after_drop() {
    let mut harness = Harness::new(SimulatorConfig::lossless().drop_a_to_b(0));
    harness.host.submit_outbound(b"STATUS?\n").unwrap();

    harness.run(200);
    assert!(harness.received.is_empty());
    assert_eq!(harness.host.output_state(), OutputState::WaitAck);

    assert!(harness.run_until(1_000, |h| h.host.is_idle()));
    assert_eq!(harness.received, b"STATUS?\n");

    let chunks = harness.host.transport().sent_chunks();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0], chunks[1]);
    println!("✓ Identical packet resent after {} ms timeout", scs_exchange::RETRANSMIT_TIMEOUT_MS);
}

#[test]
fn test_single_bit_errors_rejected_in_data_packets() {
    init_logging();
    let packet = DataPacket::new(PacketId::new(0), b"PAR 1 2 3").unwrap().encode();

    for bit in 0..packet.len() * 8 {
        let mut exchange = memory_exchange(ExchangeConfig::default());
        let mut corrupted = packet.clone();
        corrupted[bit / 8] ^= 1 << (bit % 8);
        feed(&mut exchange, &corrupted);

        exchange.clock().advance(100);
        exchange.poll_n(2);
        assert_eq!(exchange.inbound_len(), 0, "bit {} accepted", bit);
        assert_eq!(exchange.transport().pending_output(), 0, "bit {} acknowledged", bit);
    }
    println!("✓ All {} single-bit errors rejected", packet.len() * 8);
}

#[test]
fn test_single_bit_errors_rejected_in_ack_packets() {
    init_logging();
    let ack = AckPacket::new(PacketId::new(0)).encode();

    for bit in 0..ack.len() * 8 {
        let mut exchange = memory_exchange(ExchangeConfig::default());
        exchange.submit_outbound(b"X").unwrap();
        exchange.poll_n(2);
        assert_eq!(exchange.output_state(), OutputState::WaitAck);

        let mut corrupted = ack;
        corrupted[bit / 8] ^= 1 << (bit % 8);
        feed(&mut exchange, &corrupted);
        assert_eq!(exchange.output_state(), OutputState::WaitAck, "bit {}", bit);

        exchange.clock().advance(60);
        exchange.poll();
        feed(&mut exchange, &ack);
        assert_eq!(exchange.output_state(), OutputState::Idle);
    }
    assert_eq!(ack[0], ACK_PACKET_TAG);
    println!("✓ Corrupted acknowledgments ignored");
}

#[test]
fn test_sequence_wraps_without_sentinel() {
    let mut harness = Harness::new(SimulatorConfig::lossless());

    for i in 0..260u32 {
        harness.host.submit_outbound(&[i as u8]).unwrap();
        assert!(harness.run_until(100, |h| h.host.is_idle()), "packet {} stuck", i);
    }

    let ids = harness.host_data_ids();
    assert_eq!(ids.len(), 260);
    assert_eq!(ids[0], 0);
    assert_eq!(&ids[1..255], &(1..=254).collect::<Vec<u8>>()[..]);
    assert_eq!(ids[255], 1);
    assert!(!ids.contains(&0xFF));
    assert_eq!(ids.iter().filter(|&&id| id == 0).count(), 1);

    let expected: Vec<u8> = (0..260u32).map(|i| i as u8).collect();
    assert_eq!(harness.received, expected);
    println!("✓ 260 packets delivered, IDs wrap 254 -> 1");
}

#[test]
fn test_backpressure_then_recovery() {
    let device_config = ExchangeConfig::builder().with_inbound_capacity(0).build().unwrap();
    let mut harness =
        Harness::with_configs(SimulatorConfig::lossless(), ExchangeConfig::default(), device_config);
    harness.host.submit_outbound(b"READ\n").unwrap();

    harness.run(150);
    assert!(harness.received.is_empty());
    assert_eq!(harness.device.stats().acks_sent, 0);
    assert!(harness.device.stats().backpressure_drops >= 1);
    assert_eq!(harness.host.output_state(), OutputState::WaitAck);

    harness.device.set_inbound_capacity(64);
    assert!(harness.run_until(1_000, |h| h.host.is_idle()));
    assert_eq!(harness.received, b"READ\n");
    assert!(harness.host.stats().retransmissions >= 1);
    println!("✓ Full inbound buffer withholds the acknowledgment");
}

#[test]
fn test_ordering_survives_lost_packet() {
    let mut harness = Harness::new(SimulatorConfig::lossless().drop_a_to_b(1));
    let mut pending: Vec<&[u8]> = vec![&b"AA"[..], &b"BB"[..], &b"CC"[..]];
    pending.reverse();

    let done = harness.run_until(5_000, |h| {
        if h.host.outbound_len() == 0 {
            if let Some(next) = pending.pop() {
                h.host.submit_outbound(next).unwrap();
            }
        }
        pending.is_empty() && h.host.is_idle()
    });

    assert!(done);
    assert_eq!(harness.received, b"AABBCC");
    assert_eq!(harness.host_data_ids(), vec![0, 1, 1, 2]);
    assert_eq!(harness.device.stats().data_accepted, 3);
    println!("✓ AA BB CC delivered in order despite loss");
}

#[test]
fn test_full_duplex_with_slow_line() {
    let mut harness = Harness::new(SimulatorConfig::lossless().with_write_capacity(3));
    let to_device: Vec<u8> = (0..400u32).map(|i| (i % 200) as u8).collect();
    let to_host: Vec<u8> = (0..300u32).map(|i| (i % 97) as u8).collect();
    harness.host.submit_outbound(&to_device).unwrap();
    harness.device.submit_outbound(&to_host).unwrap();

    let mut host_received = Vec::new();
    let done = harness.run_until(200_000, |h| {
        let pending = h.host.inbound_len();
        host_received.extend(h.host.take_inbound(pending));
        h.received.len() == to_device.len() && host_received.len() == to_host.len()
    });

    assert!(done);
    assert_eq!(harness.received, to_device);
    assert_eq!(host_received, to_host);
    println!(
        "✓ Full duplex transfer, {} acks dropped while another was pending",
        harness.host.stats().dropped_ack_requests + harness.device.stats().dropped_ack_requests
    );
}

#[test]
fn test_lossy_link_delivers_exact_stream() {
    let sim = SimulatorConfig::lossless()
        .with_loss_rate(0.05)
        .with_corrupt_rate(0.02)
        .with_seed(2024);
    let mut harness = Harness::new(sim);
    let message: Vec<u8> = (0..2_000u32).map(|i| (i * 31 % 256) as u8).collect();
    harness.host.submit_outbound(&message).unwrap();

    assert!(harness.run_until(2_000_000, |h| h.received.len() >= message.len()));
    assert_eq!(harness.received, message);

    let host = harness.host.stats();
    let device = harness.device.stats();
    println!(
        "✓ Lossy link: {} data packets sent, {} retransmissions, {} CRC errors at device",
        host.data_sent, host.retransmissions, device.crc_errors
    );
}

#[test]
fn test_peer_restart_option() {
    init_logging();
    let first = DataPacket::new(PacketId::new(0), b"boot").unwrap().encode();
    let second = DataPacket::new(PacketId::new(1), b"run").unwrap().encode();
    let rebooted = DataPacket::new(PacketId::new(0), b"boot again").unwrap().encode();

    let mut strict = memory_exchange(ExchangeConfig::default());
    for packet in [&first, &second, &rebooted] {
        feed(&mut strict, packet);
    }
    assert_eq!(strict.take_inbound(64), b"bootrun");
    assert_eq!(strict.stats().out_of_order, 1);

    let config = ExchangeConfig::builder().with_peer_restart(true).build().unwrap();
    let mut lenient = memory_exchange(config);
    for packet in [&first, &second, &rebooted] {
        feed(&mut lenient, packet);
    }
    assert_eq!(lenient.take_inbound(64), b"bootrunboot again");
    assert_eq!(lenient.last_accepted_id(), PacketId::INITIAL);
    println!("✓ Peer restart accepted only when enabled");
}

#[test]
fn test_monitor_trace_of_exchange() {
    let mut harness = Harness::new(SimulatorConfig::lossless());
    harness.host.submit_outbound(b"Q").unwrap();
    assert!(harness.run_until(100, |h| h.host.is_idle()));

    let host_trace = harness.host.transport_mut().take_monitor();
    let device_trace = harness.device.transport_mut().take_monitor();
    assert_eq!(host_trace, b"< D 00\r\n> A 00\r\n");
    assert_eq!(device_trace, b"> D 00\r\n< A 00\r\n");
    println!("✓ Monitor trace: {:?}", String::from_utf8_lossy(&host_trace));
}
