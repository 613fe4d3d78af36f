use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use pktbridge_capture::{
    channel, Backpressure, CaptureConfig, CaptureSession, CaptureState, ChannelConfig, Error,
    FaultPolicy, LinkType, MemorySource, PacketRecord, PacketView, Verdict,
};

/// Ethernet + IPv4 + TCP frame with no payload
fn tcp_frame(src: u16, dst: u16, seq: u32) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(54);
    buf.put_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    buf.put_slice(&[0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB]);
    buf.put_u16(0x0800);

    buf.put_u8(0x45);
    buf.put_u8(0);
    buf.put_u16(40);
    buf.put_u16(0);
    buf.put_u16(0x4000);
    buf.put_u8(64);
    buf.put_u8(6);
    buf.put_u16(0);
    buf.put_slice(&[10, 0, 0, 1]);
    buf.put_slice(&[10, 0, 0, 2]);

    buf.put_u16(src);
    buf.put_u16(dst);
    buf.put_u32(seq);
    buf.put_u32(0);
    buf.put_u16(0x5018); // data offset 5, PSH|ACK
    buf.put_u16(65535);
    buf.put_u16(0);
    buf.put_u16(0);
    buf.to_vec()
}

fn tcp_source(count: u32) -> MemorySource {
    let mut source = MemorySource::new(LinkType::Ethernet);
    for n in 0..count {
        source.push_at(Duration::from_secs(u64::from(n)), tcp_frame(8080, 80, n + 1));
    }
    source
}

#[tokio::test]
async fn channel_delivers_in_capture_order() {
    let mut session = CaptureSession::new(tcp_source(3));
    let link = session.link_type().unwrap();

    let stream = session
        .start_channel(ChannelConfig::default(), "eth-test")
        .unwrap();
    let records = stream.collect_all().await;

    assert_eq!(records.len(), 3);
    for (n, record) in records.iter().enumerate() {
        let tcp = record.transport(link).unwrap();
        assert_eq!(tcp.source_port(), 8080);
        assert_eq!(tcp.destination_port(), 80);
        assert_eq!(tcp.as_tcp().unwrap().sequence(), n as u32 + 1);
        assert_eq!(record.header.ts_sec(), n as u64);
        assert_eq!(record.context, "eth-test");
    }

    session.wait().unwrap();
    let stats = session.stats();
    assert_eq!(stats.packets_captured, 3);
    assert_eq!(stats.packets_delivered, 3);
    assert_eq!(stats.bytes_captured, 3 * 54);
    assert_eq!(stats.engine.unwrap().received, 3);
}

#[tokio::test]
async fn channel_drains_after_stop() {
    let source = tcp_source(4).keep_open(Duration::from_millis(2));
    let mut session = CaptureSession::new(source);
    let mut stream = session.start_channel(ChannelConfig::unbounded(), ()).unwrap();

    let first = stream.recv().await.unwrap();
    assert_eq!(first.header.ts_sec(), 0);

    // Packets queued before the stop are still delivered
    while session.stats().packets_delivered < 4 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    session.stop().unwrap();

    let rest = stream.collect_all().await;
    assert_eq!(rest.len(), 3);
}

#[test]
fn channel_blocking_consumer() {
    let mut session = CaptureSession::new(tcp_source(20));
    let config = ChannelConfig::bounded(2).with_backpressure(Backpressure::Block);
    let mut stream = session.start_channel(config, ()).unwrap();

    let consumer = thread::spawn(move || {
        stream
            .blocking_iter()
            .map(|record| record.header.ts_sec())
            .collect::<Vec<_>>()
    });

    session.wait().unwrap();
    let seen = consumer.join().unwrap();
    assert_eq!(seen, (0..20).collect::<Vec<u64>>());
    assert_eq!(session.stats().queue_dropped, 0);
}

#[test]
fn closed_consumer_ends_the_loop() {
    let source = tcp_source(3).keep_open(Duration::from_millis(1));
    let mut session = CaptureSession::new(source);

    let (strategy, stream) = channel(&ChannelConfig::default(), ()).unwrap();
    drop(stream);
    session.start(strategy).unwrap();
    session.wait().unwrap();

    let stats = session.stats();
    assert_eq!(stats.packets_captured, 1);
    assert_eq!(stats.packets_delivered, 0);
    assert_eq!(stats.queue_dropped, 1);
}

#[test]
fn loop_handler_runs_sequentially() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);

    let mut session = CaptureSession::new(tcp_source(3));
    session
        .start_loop(move |record: PacketRecord| {
            let n = record.header.ts_sec();
            sink.lock().push(format!("start {}", n));
            thread::sleep(Duration::from_millis(5));
            sink.lock().push(format!("end {}", n));
            Verdict::Continue
        })
        .unwrap();
    session.wait().unwrap();

    assert_eq!(
        *events.lock(),
        vec!["start 0", "end 0", "start 1", "end 1", "start 2", "end 2"]
    );
}

#[test]
fn loop_handler_can_stop() {
    let mut session = CaptureSession::new(tcp_source(5));
    let mut seen = 0;
    session
        .start_loop(move |_record| {
            seen += 1;
            Verdict::from(seen == 2)
        })
        .unwrap();
    session.wait().unwrap();

    let stats = session.stats();
    assert_eq!(stats.packets_captured, 2);
    assert_eq!(stats.packets_delivered, 2);
}

#[test]
fn alloc_less_decodes_in_place() {
    let ports = Arc::new(Mutex::new(Vec::new()));
    let kept = Arc::new(Mutex::new(Vec::new()));
    let (ports_sink, kept_sink) = (Arc::clone(&ports), Arc::clone(&kept));

    let mut session = CaptureSession::new(tcp_source(3));
    let link = session.link_type().unwrap();
    session
        .start_loop_allocless(move |view: PacketView<'_>| {
            let tcp = view.transport(link).unwrap();
            let seq = tcp.as_tcp().unwrap().sequence();
            ports_sink.lock().push((tcp.source_port(), seq));
            if seq == 2 {
                kept_sink.lock().push(view.to_record());
            }
            Verdict::Continue
        })
        .unwrap();
    session.wait().unwrap();

    assert_eq!(*ports.lock(), vec![(8080, 1), (8080, 2), (8080, 3)]);
    let kept = kept.lock();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].len(), 54);
    assert_eq!(session.stats().packets_delivered, 3);
}

#[test]
fn handler_panic_is_contained() {
    let mut session = CaptureSession::new(tcp_source(3));
    session
        .start_loop(|record| {
            if record.header.ts_sec() == 1 {
                panic!("bad packet");
            }
            Verdict::Continue
        })
        .unwrap();
    session.wait().unwrap();

    let stats = session.stats();
    assert_eq!(stats.packets_captured, 3);
    assert_eq!(stats.packets_delivered, 2);
    assert_eq!(stats.handler_faults, 1);
}

#[test]
fn fault_policy_stop_ends_run() {
    let config = CaptureConfig::default().with_fault_policy(FaultPolicy::Stop);
    let mut session = CaptureSession::with_config(tcp_source(5), config).unwrap();
    session
        .start_loop_allocless(|view| {
            if view.header().ts_sec() == 1 {
                panic!("bad packet");
            }
            Verdict::Continue
        })
        .unwrap();
    session.wait().unwrap();

    let stats = session.stats();
    assert_eq!(stats.packets_captured, 2);
    assert_eq!(stats.handler_faults, 1);
}

#[test]
fn max_packets_limits_run() {
    let config = CaptureConfig::default().with_max_packets(2);
    let mut session = CaptureSession::with_config(tcp_source(5), config).unwrap();
    session.start_loop(|_record| Verdict::Continue).unwrap();
    session.wait().unwrap();

    assert_eq!(session.stats().packets_delivered, 2);
}

#[test]
fn delayed_stop_ends_idle_capture() {
    let source = tcp_source(1).keep_open(Duration::from_millis(2));
    let mut session = CaptureSession::new(source);
    session.start_loop(|_record| Verdict::Continue).unwrap();
    assert_eq!(session.state(), CaptureState::Running);

    let timer = session.stop_handle().stop_after(Duration::from_millis(30));
    session.wait().unwrap();
    timer.join().unwrap();

    assert_eq!(session.state(), CaptureState::Stopped);
    assert_eq!(session.stats().packets_delivered, 1);
}

#[test]
fn restart_requires_stop() {
    let mut session = CaptureSession::new(tcp_source(1));
    session.start_loop(|_record| Verdict::Continue).unwrap();
    assert!(matches!(
        session.start_loop_allocless(|_view| Verdict::Continue),
        Err(Error::AlreadyRunning)
    ));

    session.stop().unwrap();
    assert!(session.start_loop(|_record| Verdict::Continue).is_ok());
    session.stop().unwrap();
}

#[test]
fn stop_while_handler_is_running() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let source = tcp_source(5).keep_open(Duration::from_millis(2));
    let mut session = CaptureSession::new(source);
    let mut seen = 0;
    session
        .start_loop(move |_record| {
            seen += 1;
            if seen == 2 {
                let _ = entered_tx.send(());
                let _ = release_rx.recv();
            }
            Verdict::Continue
        })
        .unwrap();

    entered_rx.recv().unwrap();
    let stopper = {
        let stop = session.stop_handle();
        thread::spawn(move || {
            stop.stop();
            release_tx.send(()).unwrap();
        })
    };
    stopper.join().unwrap();
    session.stop().unwrap();

    let stats = session.stats();
    assert_eq!(stats.packets_captured, 2);
    assert_eq!(stats.packets_delivered, 2);
    assert_eq!(session.state(), CaptureState::Stopped);
}

#[test]
fn stats_settle_after_run() {
    let mut session = CaptureSession::new(tcp_source(3));
    session.start_loop(|_record| Verdict::Continue).unwrap();
    session.wait().unwrap();

    let first = session.stats();
    thread::sleep(Duration::from_millis(20));
    let second = session.stats();
    assert_eq!(first.duration, second.duration);
    assert_eq!(first.packets_per_second, second.packets_per_second);
}
