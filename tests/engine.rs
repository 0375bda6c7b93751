//! End-to-end engine tests against a scripted fake device on loopback UDP.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use govee_lan_rs::{
    Brightness, CapabilityError, Color, CommandRequest, Controller, ControllerConfig, Error, Event,
    Kelvin, Outcome, PowerState,
};

#[derive(Debug, Clone)]
struct LightState {
    on: bool,
    brightness: u8,
    r: u8,
    g: u8,
    b: u8,
    kelvin: u16,
}

impl Default for LightState {
    fn default() -> Self {
        LightState {
            on: false,
            brightness: 100,
            r: 255,
            g: 255,
            b: 255,
            kelvin: 0,
        }
    }
}

struct FakeInner {
    id: String,
    sku: String,
    state: Mutex<LightState>,
    /// turn/brightness/colorwc/ptReal frames received.
    command_frames: AtomicUsize,
    /// devStatus queries to swallow before answering again.
    drop_status_replies: AtomicUsize,
    /// When set the device neither answers nor applies anything.
    muted: AtomicBool,
    command_log: Mutex<Vec<Value>>,
}

struct FakeLight {
    inner: Arc<FakeInner>,
    addr: SocketAddr,
}

impl FakeLight {
    async fn spawn(id: &str, sku: &str) -> FakeLight {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let inner = Arc::new(FakeInner {
            id: id.to_string(),
            sku: sku.to_string(),
            state: Mutex::new(LightState::default()),
            command_frames: AtomicUsize::new(0),
            drop_status_replies: AtomicUsize::new(0),
            muted: AtomicBool::new(false),
            command_log: Mutex::new(Vec::new()),
        });
        tokio::spawn(run_fake(socket, Arc::clone(&inner)));
        FakeLight { inner, addr }
    }

    fn port(&self) -> u16 {
        self.addr.port()
    }

    fn mute(&self) {
        self.inner.muted.store(true, Ordering::SeqCst);
    }

    fn drop_next_status_replies(&self, n: usize) {
        self.inner.drop_status_replies.store(n, Ordering::SeqCst);
    }

    fn command_frames(&self) -> usize {
        self.inner.command_frames.load(Ordering::SeqCst)
    }

    async fn command_log(&self) -> Vec<Value> {
        self.inner.command_log.lock().await.clone()
    }
}

async fn run_fake(socket: UdpSocket, light: Arc<FakeInner>) {
    let mut buffer = [0u8; 2048];
    loop {
        let Ok((size, source)) = socket.recv_from(&mut buffer).await else {
            return;
        };
        if light.muted.load(Ordering::SeqCst) {
            continue;
        }
        let Ok(frame) = serde_json::from_slice::<Value>(&buffer[..size]) else {
            continue;
        };
        let cmd = frame["msg"]["cmd"].as_str().unwrap_or_default().to_string();
        let data = frame["msg"]["data"].clone();

        match cmd.as_str() {
            "scan" => {
                let announcement = json!({"msg": {"cmd": "scan", "data": {
                    "ip": "127.0.0.1",
                    "device": light.id,
                    "sku": light.sku,
                    "bleVersionSoft": "1.04.04",
                    "wifiVersionSoft": "1.02.11",
                }}});
                let _ = socket
                    .send_to(announcement.to_string().as_bytes(), source)
                    .await;
            }
            "devStatus" => {
                let dropped = light
                    .drop_status_replies
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if dropped {
                    continue;
                }
                let state = light.state.lock().await.clone();
                let status = json!({"msg": {"cmd": "devStatus", "data": {
                    "onOff": if state.on { 1 } else { 0 },
                    "brightness": state.brightness,
                    "color": {"r": state.r, "g": state.g, "b": state.b},
                    "colorTemInKelvin": state.kelvin,
                }}});
                let _ = socket.send_to(status.to_string().as_bytes(), source).await;
            }
            "turn" | "brightness" | "colorwc" | "ptReal" => {
                light.command_frames.fetch_add(1, Ordering::SeqCst);
                light.command_log.lock().await.push(frame.clone());
                let mut state = light.state.lock().await;
                match cmd.as_str() {
                    "turn" => state.on = data["value"].as_u64() == Some(1),
                    "brightness" => {
                        state.brightness = data["value"].as_u64().unwrap_or(0) as u8;
                    }
                    "colorwc" => {
                        let kelvin = data["colorTemInKelvin"].as_u64().unwrap_or(0) as u16;
                        if kelvin > 0 {
                            state.kelvin = kelvin;
                            state.r = 0;
                            state.g = 0;
                            state.b = 0;
                        } else {
                            state.kelvin = 0;
                            state.r = data["color"]["r"].as_u64().unwrap_or(0) as u8;
                            state.g = data["color"]["g"].as_u64().unwrap_or(0) as u8;
                            state.b = data["color"]["b"].as_u64().unwrap_or(0) as u8;
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
}

fn test_config(device_port: u16) -> ControllerConfig {
    ControllerConfig {
        listen_address: Ipv4Addr::LOCALHOST,
        // Ephemeral: the fake device replies to the packet source.
        listen_port: 0,
        broadcast_address: Ipv4Addr::LOCALHOST,
        discovery_port: device_port,
        command_port: device_port,
        discovery_enabled: true,
        discovery_interval: Duration::from_millis(200),
        refresh_enabled: false,
        refresh_interval: Duration::from_secs(30),
        device_timeout: Duration::from_secs(30),
        response_deadline: Duration::from_millis(400),
        max_attempts: 3,
        retry_backoff: vec![Duration::from_millis(50)],
        shutdown_ceiling: Duration::from_secs(2),
        temperature_only: false,
    }
}

async fn wait_for_device(controller: &Controller, id: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if controller.device(id).await.is_ok() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("device was not discovered in time");
}

#[tokio::test]
async fn confirms_power_command_on_first_attempt() {
    let light = FakeLight::spawn("AA:BB:CC:01", "H6163").await;
    // Drive discovery by hand so the callback is in place before the first
    // scan goes out.
    let mut config = test_config(light.port());
    config.discovery_enabled = false;
    let controller = Controller::start(config).await.unwrap();
    let (event_tx, event_rx) = std::sync::mpsc::channel();
    controller.set_event_callback(move |event| {
        let _ = event_tx.send(event);
    });

    controller.discover_once().await;
    wait_for_device(&controller, "AA:BB:CC:01").await;

    let outcome = controller
        .send_command("AA:BB:CC:01", CommandRequest::Power(PowerState::On))
        .await
        .unwrap();
    let Outcome::Confirmed {
        attempts, state, ..
    } = outcome
    else {
        panic!("expected confirmation, got {outcome:?}");
    };
    assert_eq!(attempts, 1);
    assert!(state.power);

    // The registry reflects the reported state, and discovery produced an
    // event along the way.
    let summary = controller.device("AA:BB:CC:01").await.unwrap();
    assert_eq!(summary.power, Some(true));
    assert!(matches!(
        event_rx.try_iter().next(),
        Some(Event::DeviceDiscovered(_))
    ));

    controller.shutdown().await;
}

#[tokio::test]
async fn retries_after_dropped_response_and_confirms_on_second_attempt() {
    let light = FakeLight::spawn("AA:BB:CC:02", "H6163").await;
    let controller = Controller::start(test_config(light.port())).await.unwrap();
    wait_for_device(&controller, "AA:BB:CC:02").await;

    // The device swallows the first status reply, simulating UDP loss.
    light.drop_next_status_replies(1);
    let outcome = controller
        .send_command("AA:BB:CC:02", CommandRequest::Power(PowerState::On))
        .await
        .unwrap();

    assert!(outcome.is_confirmed());
    assert_eq!(outcome.attempts(), 2);

    controller.shutdown().await;
}

#[tokio::test]
async fn capability_and_policy_gates_reject_before_any_packet() {
    // H6160 has RGB but no color temperature control.
    let light = FakeLight::spawn("AA:BB:CC:03", "H6160").await;
    let controller = Controller::start(test_config(light.port())).await.unwrap();
    wait_for_device(&controller, "AA:BB:CC:03").await;

    let err = controller
        .send_command(
            "AA:BB:CC:03",
            CommandRequest::Temperature(Kelvin::create(4000).unwrap()),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Capability(CapabilityError::NotSupported(_))
    ));

    // Temperature-only mode blocks RGB even though the device supports it,
    // with the policy error rather than the capability error.
    controller.set_temperature_only_mode(true);
    let err = controller
        .send_command(
            "AA:BB:CC:03",
            CommandRequest::Rgb(Color::rgb(255, 0, 0)),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Capability(CapabilityError::ModeRestricted)
    ));

    // Both rejections were synchronous: not one command frame reached the
    // device.
    assert_eq!(light.command_frames(), 0);

    // Disabling the mode restores RGB without any re-discovery.
    controller.set_temperature_only_mode(false);
    let outcome = controller
        .send_command(
            "AA:BB:CC:03",
            CommandRequest::Rgb(Color::rgb(255, 0, 0)),
        )
        .await
        .unwrap();
    assert!(outcome.is_confirmed());
    assert_eq!(light.command_frames(), 1);

    controller.shutdown().await;
}

#[tokio::test]
async fn unresponsive_device_fails_after_max_attempts_with_state_untouched() {
    let light = FakeLight::spawn("AA:BB:CC:04", "H6163").await;
    let controller = Controller::start(test_config(light.port())).await.unwrap();
    wait_for_device(&controller, "AA:BB:CC:04").await;

    // Establish a confirmed state first.
    let outcome = controller
        .send_command("AA:BB:CC:04", CommandRequest::Power(PowerState::On))
        .await
        .unwrap();
    assert!(outcome.is_confirmed());
    let before = controller.device("AA:BB:CC:04").await.unwrap();

    // Then the device goes dark.
    light.mute();
    let outcome = controller
        .send_command(
            "AA:BB:CC:04",
            CommandRequest::Brightness(Brightness::create(30).unwrap()),
        )
        .await
        .unwrap();
    let Outcome::Failed {
        attempts,
        last_observed,
        ..
    } = outcome
    else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(attempts, 3);
    assert_eq!(last_observed, None);

    // The registry was never optimistically updated.
    let after = controller.device("AA:BB:CC:04").await.unwrap();
    assert_eq!(after.power, before.power);
    assert_eq!(after.brightness, before.brightness);

    controller.shutdown().await;
}

#[tokio::test]
async fn silent_device_is_evicted_from_reachable_list() {
    let light = FakeLight::spawn("AA:BB:CC:05", "H6163").await;
    let mut config = test_config(light.port());
    config.device_timeout = Duration::from_millis(600);
    let controller = Controller::start(config).await.unwrap();
    let (event_tx, event_rx) = std::sync::mpsc::channel();
    controller.set_event_callback(move |event| {
        let _ = event_tx.send(event);
    });
    wait_for_device(&controller, "AA:BB:CC:05").await;

    light.mute();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if controller.list_devices().await.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("silent device was not evicted");

    assert!(
        event_rx
            .try_iter()
            .any(|event| matches!(event, Event::DeviceLost(_)))
    );

    controller.shutdown().await;
}

#[tokio::test]
async fn same_device_commands_run_in_submission_order() {
    let light = FakeLight::spawn("AA:BB:CC:06", "H6163").await;
    let controller = Arc::new(Controller::start(test_config(light.port())).await.unwrap());
    wait_for_device(&controller, "AA:BB:CC:06").await;

    let first = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            controller
                .send_command(
                    "AA:BB:CC:06",
                    CommandRequest::Brightness(Brightness::create(30).unwrap()),
                )
                .await
        })
    };
    // Give the first intent time to enter its queue before the second.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            controller
                .send_command(
                    "AA:BB:CC:06",
                    CommandRequest::Brightness(Brightness::create(70).unwrap()),
                )
                .await
        })
    };

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert!(first.is_confirmed());
    assert!(second.is_confirmed());

    // The device saw the frames strictly in submission order, and the
    // final state belongs to the second command.
    let log = light.command_log().await;
    let values: Vec<u64> = log
        .iter()
        .filter(|frame| frame["msg"]["cmd"] == "brightness")
        .map(|frame| frame["msg"]["data"]["value"].as_u64().unwrap())
        .collect();
    assert_eq!(values.first(), Some(&30));
    assert_eq!(values.last(), Some(&70));
    let summary = controller.device("AA:BB:CC:06").await.unwrap();
    assert_eq!(summary.brightness, Some(70));

    match Arc::try_unwrap(controller) {
        Ok(controller) => controller.shutdown().await,
        Err(_) => panic!("controller still shared"),
    }
}
