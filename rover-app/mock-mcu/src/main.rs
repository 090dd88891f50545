mod sim;

use clap::Parser;
use core::cell::RefCell;
use embassy_executor::{Executor, Spawner};
use embassy_net::{Config, Ipv4Address, Ipv4Cidr, Runner, Stack, StackResources};
use embassy_net_tuntap::TunTapDevice;
use heapless::Vec;
use rand_core::{OsRng, TryRngCore};
use rover_core::mk_static;
use rover_core::utils::controllers::config::{
    LISTEN_PORT, PCA9685_ADDRESS, PWM_TIMER, PinTable,
};
use rover_core::utils::controllers::servo::SERVO_CHANNELS;
use rover_core::utils::controllers::{MotorController, ServoController};
use rover_core::utils::math::pulse::{SWEEP_PHASE_DEG, sweep_angle};
use rover_core::utils::{self, Delay, Duration, Instant, RoverController, Timer};
use sim::{SimPca9685, SimPin, SimPwm};
use static_cell::StaticCell;
use std::path::PathBuf;
use tracing::{debug, error, info};

type Motors = MotorController<SimPin, SimPwm>;
type Servos = ServoController<'static, SimPca9685>;
type Rover = RoverController<Motors, Servos>;

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts
{
    /// TAP device name
    #[clap(long, default_value = "tap0")]
    tap: String,
    /// use a static IP instead of DHCP
    #[clap(long)]
    static_ip: bool,
    /// UDP port for rover commands
    #[clap(long, default_value_t = LISTEN_PORT)]
    port: u16,
    /// JSON pin table replacing the built-in wiring
    #[clap(long)]
    pins: Option<PathBuf>,
    /// sweep all servos instead of listening for commands
    #[clap(long)]
    sweep: bool,
}

fn fail(msg: &str) -> ! {
    error!("{msg}");
    std::process::exit(1)
}

fn load_pins(path: Option<&PathBuf>) -> PinTable {
    let Some(path) = path else {
        return PinTable::default();
    };
    let text = std::fs::read_to_string(path)
        .unwrap_or_else(|e| fail(&format!("cannot read {}: {e}", path.display())));
    let table = serde_json::from_str(&text)
        .unwrap_or_else(|e| fail(&format!("bad pin table {}: {e}", path.display())));
    info!("pin table loaded from {}", path.display());
    table
}

fn build_motors(table: &PinTable) -> Motors {
    let max_duty = PWM_TIMER.max_duty();
    MotorController::from_table(table, &PWM_TIMER, |board, motor, pins| {
        debug!(board, motor, ?pins, "wiring motor");
        (
            SimPin::new(pins.forward),
            SimPin::new(pins.reverse),
            SimPwm::new(pins.pwm_channel, pins.enable, max_duty),
        )
    })
    .unwrap_or_else(|e| fail(&format!("motor init failed: {e}")))
}

fn build_servos() -> Servos {
    let i2c_bus = &*mk_static!(
        RefCell<SimPca9685>,
        RefCell::new(SimPca9685::new(PCA9685_ADDRESS))
    );
    let mut servos = ServoController::new(i2c_bus, PCA9685_ADDRESS);
    if let Err(e) = servos.init(&mut Delay) {
        fail(&format!("servo init failed: {e}"));
    }
    if let Ok(mode1) = servos.read_mode1() {
        debug!("PCA9685 MODE1 = {mode1:#04x}");
    }
    servos
}

fn network(opts: &Opts) -> (Stack<'static>, Runner<'static, TunTapDevice>) {
    let device = TunTapDevice::new(&opts.tap)
        .unwrap_or_else(|e| fail(&format!("cannot open {}: {e}", opts.tap)));
    let config = if opts.static_ip {
        Config::ipv4_static(embassy_net::StaticConfigV4 {
            address: Ipv4Cidr::new(Ipv4Address::new(192, 168, 69, 2), 24),
            dns_servers: Vec::new(),
            gateway: Some(Ipv4Address::new(192, 168, 69, 1)),
        })
    } else {
        Config::dhcpv4(Default::default())
    };
    let mut seed_buf = [0; 8];
    OsRng
        .try_fill_bytes(&mut seed_buf)
        .unwrap_or_else(|e| fail(&format!("no OS entropy: {e}")));
    let seed = u64::from_le_bytes(seed_buf);

    embassy_net::new(
        device,
        config,
        mk_static!(StackResources<3>, StackResources::<3>::new()),
        seed,
    )
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, TunTapDevice>) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn listener_task(
    stack: Stack<'static>,
    port: u16,
    mut rover: Rover,
) {
    info!("Waiting for network link...");
    stack.wait_config_up().await;

    if let Err(e) = utils::udp(stack, port, &mut rover).await {
        error!(?e, "cannot bind UDP port {port}");
    }
}

#[embassy_executor::task]
async fn sweep_task(mut servos: Servos) -> ! {
    info!(
        "Sweeping {} servos, {}° apart",
        SERVO_CHANNELS, SWEEP_PHASE_DEG
    );
    let start = Instant::now();
    loop {
        let elapsed = start.elapsed().as_millis();
        for channel in 0..SERVO_CHANNELS {
            if let Err(e) = servos.set_servo_angle(channel, sweep_angle(elapsed, channel)) {
                error!("servo {channel}: {e}");
            }
        }
        Timer::after(Duration::from_millis(20)).await;
    }
}

fn start(
    spawner: Spawner,
    opts: Opts,
) {
    let table = load_pins(opts.pins.as_ref());
    let motors = build_motors(&table);
    let servos = build_servos();

    if opts.sweep {
        if let Err(e) = spawner.spawn(sweep_task(servos)) {
            fail(&format!("cannot spawn sweep: {e:?}"));
        }
        return;
    }

    let (stack, runner) = network(&opts);
    let rover = RoverController::new(motors, servos);
    if let Err(e) = spawner.spawn(net_task(runner)) {
        fail(&format!("cannot spawn network: {e:?}"));
    }
    info!("Starting UDP listener on port {}", opts.port);
    if let Err(e) = spawner.spawn(listener_task(stack, opts.port, rover)) {
        fail(&format!("cannot spawn listener: {e:?}"));
    }
}

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let opts = Opts::parse();
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| start(spawner, opts));
}
