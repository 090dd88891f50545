#![no_std]
#![no_main]
extern crate alloc;

// Standard imports
use core::cell::RefCell;

// ESP-specific imports
use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::{
    clock::CpuClock,
    gpio::{AnyPin, Level, Output, OutputConfig},
    i2c::master::{Config, I2c},
    ledc::{
        channel::{self, ChannelIFace},
        timer::{self, TimerIFace},
        LSGlobalClkSource, Ledc, LowSpeed,
    },
    rng::Rng,
    time::Rate,
    timer::timg::TimerGroup,
    Blocking,
};
use esp_wifi::{
    init,
    wifi::{WifiController, WifiDevice},
    EspWifiController,
};
use log::LevelFilter;

// Internal Modules
use rover_core::{
    mk_static,
    utils::{
        self,
        controllers::{
            config::{MotorPins, PinTable, LISTEN_PORT, PCA9685_ADDRESS, PWM_TIMER},
            MotorController, ServoController,
        },
        RoverController,
    },
};

// Constants for the rover's access point
const SSID: &str = env!("AP_SSID");
const PASSWORD: &str = env!("AP_PASSWORD");
const AP_CHANNEL: u8 = 1;

type Bus = I2c<'static, Blocking>;
type Pwm = channel::Channel<'static, LowSpeed>;
type Rover = RoverController<MotorController<Output<'static>, Pwm>, ServoController<'static, Bus>>;

// Static memory for the servo bus
static I2C_BUS: static_cell::StaticCell<RefCell<Bus>> = static_cell::StaticCell::new();

/// Log a bring-up failure and park the core.
fn halt(
    what: &str,
    err: impl core::fmt::Debug,
) -> ! {
    tracing::error!("{} failed: {:?}", what, err);
    loop {
        core::hint::spin_loop();
    }
}

fn ledc_channel(number: u8) -> channel::Number {
    // The pin table is validated before any channel is built, so `number < 8`.
    match number {
        0 => channel::Number::Channel0,
        1 => channel::Number::Channel1,
        2 => channel::Number::Channel2,
        3 => channel::Number::Channel3,
        4 => channel::Number::Channel4,
        5 => channel::Number::Channel5,
        6 => channel::Number::Channel6,
        _ => channel::Number::Channel7,
    }
}

#[esp_hal_embassy::main]
async fn main(spawner: embassy_executor::Spawner) -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    tracing::info!("Logger initialized");

    let esp_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(esp_config);

    esp_alloc::heap_allocator!(size: 72 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let mut rng = Rng::new(peripherals.RNG);

    // embassy-time backs the servo settle delays, so start it first.
    use esp_hal::timer::systimer::SystemTimer;
    let systimer = SystemTimer::new(peripherals.SYSTIMER);
    esp_hal_embassy::init(systimer.alarm0);

    // Servo driver: PCA9685 on I2C0, SDA 18 / SCL 17 (`SERVO_BUS_GPIOS`) at 100 kHz
    // *******************************************************************
    let i2c_config = Config::default().with_frequency(Rate::from_khz(100));
    let i2c_bus = I2C_BUS.init(RefCell::new(
        I2c::new(peripherals.I2C0, i2c_config)
            .unwrap_or_else(|e| halt("I2C config", e))
            .with_sda(peripherals.GPIO18)
            .with_scl(peripherals.GPIO17),
    ));

    let mut servos = ServoController::new(i2c_bus, PCA9685_ADDRESS);
    if let Err(e) = servos.init(&mut utils::Delay) {
        halt("PCA9685 init", e);
    }

    // Motor boards: one LEDC timer shared by every enable channel
    // *******************************************************************
    let mut ledc = Ledc::new(peripherals.LEDC);
    ledc.set_global_slow_clock(LSGlobalClkSource::APBClk);

    let lstimer = mk_static!(
        timer::Timer<'static, LowSpeed>,
        ledc.timer::<LowSpeed>(timer::Number::Timer0)
    );
    lstimer
        .configure(timer::config::Config {
            duty: timer::config::Duty::Duty8Bit,
            clock_source: timer::LSClockSource::APBClk,
            frequency: Rate::from_hz(PWM_TIMER.frequency_hz),
        })
        .unwrap_or_else(|e| halt("LEDC timer", e));
    let lstimer = &*lstimer;

    let output = |gpio: u8| {
        // SAFETY: `from_table` rejects tables that reuse a GPIO or claim one
        // of `SERVO_BUS_GPIOS`, so each pin is stolen once and never aliases
        // the I2C pair.
        let pin = unsafe { AnyPin::steal(gpio) };
        Output::new(pin, Level::Low, OutputConfig::default())
    };

    let motors = MotorController::from_table(
        &PinTable::DEFAULT,
        &PWM_TIMER,
        |_, _, pins: &MotorPins| {
            let mut enable = ledc.channel(ledc_channel(pins.pwm_channel), output(pins.enable));
            enable
                .configure(channel::config::Config {
                    timer: lstimer,
                    duty_pct: 0,
                    pin_config: channel::config::PinConfig::PushPull,
                })
                .unwrap_or_else(|e| halt("LEDC channel", e));
            (output(pins.forward), output(pins.reverse), enable)
        },
    )
    .unwrap_or_else(|e| halt("motor init", e));

    let mut rover: Rover = RoverController::new(motors, servos);

    // Wi-Fi Access Point Block
    // *******************************************************************
    let esp_wifi_ctrl = &*mk_static!(
        EspWifiController<'static>,
        init(timg0.timer0, rng.clone(), peripherals.RADIO_CLK)
            .unwrap_or_else(|e| halt("esp-wifi", e))
    );

    let (controller, interfaces) = esp_wifi::wifi::new(esp_wifi_ctrl, peripherals.WIFI)
        .unwrap_or_else(|e| halt("Wi-Fi", e));

    let ap_address = embassy_net::Ipv4Address::new(192, 168, 4, 1);
    let ap_config = embassy_net::Config::ipv4_static(embassy_net::StaticConfigV4 {
        address: embassy_net::Ipv4Cidr::new(ap_address, 24),
        gateway: Some(ap_address),
        dns_servers: Default::default(),
    });
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;

    // Init network stack
    let (ap_stack, ap_runner) = embassy_net::new(
        interfaces.ap,
        ap_config,
        mk_static!(embassy_net::StackResources<3>, embassy_net::StackResources::<3>::new()),
        seed,
    );
    // End of Wi-Fi Access Point Block
    // ************************************************************

    spawner.spawn(connection(controller)).ok();
    spawner.spawn(net_task(ap_runner)).ok();

    wait_for_network(&ap_stack).await;

    match utils::udp(ap_stack, LISTEN_PORT, &mut rover).await {
        Err(e) => halt("UDP bind", e),
    }
}

/// Task to keep the access point up
#[embassy_executor::task]
async fn connection(mut controller: WifiController<'static>) {
    use esp_wifi::wifi::{
        AccessPointConfiguration, AuthMethod, Configuration, WifiEvent, WifiState,
    };
    tracing::info!("Device capabilities: {:?}", controller.capabilities());
    loop {
        if esp_wifi::wifi::wifi_state() == WifiState::ApStarted {
            controller.wait_for_event(WifiEvent::ApStop).await;
            utils::Timer::after(utils::Duration::from_millis(5000)).await;
        }

        if !matches!(controller.is_started(), Ok(true)) {
            let (Ok(ssid), Ok(password)) = (SSID.try_into(), PASSWORD.try_into()) else {
                tracing::error!("AP credentials too long");
                return;
            };
            let ap_config = Configuration::AccessPoint(AccessPointConfiguration {
                ssid,
                password,
                channel: AP_CHANNEL,
                max_connections: 1,
                auth_method: if PASSWORD.is_empty() {
                    AuthMethod::None
                } else {
                    AuthMethod::WPA2Personal
                },
                ..Default::default()
            });
            if let Err(e) = controller.set_configuration(&ap_config) {
                tracing::error!("AP configuration rejected: {e:?}");
                return;
            }
            match controller.start_async().await {
                Ok(()) => tracing::info!("Access point {} up on channel {}", SSID, AP_CHANNEL),
                Err(e) => {
                    tracing::warn!("Failed to start AP: {e:?}");
                    utils::Timer::after(utils::Duration::from_millis(5000)).await;
                }
            }
        }
    }
}

/// Task to manage the network stack
#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, WifiDevice<'static>>) {
    runner.run().await;
}

/// Helper function to wait for the access point link
async fn wait_for_network(stack: &embassy_net::Stack<'static>) {
    loop {
        if stack.is_link_up() {
            break;
        }
        utils::Timer::after(utils::Duration::from_millis(500)).await;
    }

    if let Some(config) = stack.config_v4() {
        tracing::info!("Access point address: {}", config.address);
    }
    tracing::info!("Connect to {} and send UDP commands to port {}", SSID, LISTEN_PORT);
}
