use embassy_stm32::adc::{Adc, AdcChannel, AnyAdcChannel};
use embassy_stm32::flash::Flash;
use embassy_stm32::gpio::Pull;
use embassy_stm32::mode::Async;
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::input_capture::{CapturePin, InputCapture};
use embassy_stm32::usart::{Config as UsartConfig, RingBufferedUartRx, Uart, UartTx};
use embassy_stm32::{adc, bind_interrupts, pac, peripherals, rcc, timer, usart, Config};
use embassy_time::Timer;

use crate::config::{
    PCLK_HZ, RPM_TIMER_PSC, RX_BUFFER_SIZE, SPEED_TIMER_PSC, UART_BAUDRATE, WIPER_POLL_DELAY_US,
};
use crate::drivers::pot::WiperBus;
use crate::drivers::strain::SampleSource;
use crate::protocol::{ResponseSink, SinkError};
use crate::settings::flash::FlashStore;

// ── IRQ table ─────────────────────────────────────────────
bind_interrupts!(pub struct Irqs {
    USART1 => usart::InterruptHandler<peripherals::USART1>;
    ADC1_COMP => adc::InterruptHandler<peripherals::ADC>;
    TIM1_CC => timer::CaptureCompareInterruptHandler<peripherals::TIM1>;
    TIM2 => timer::CaptureCompareInterruptHandler<peripherals::TIM2>;
    TIM3 => timer::CaptureCompareInterruptHandler<peripherals::TIM3>;
});

static mut SERIAL_DMA_BUF: [u8; RX_BUFFER_SIZE] = [0; RX_BUFFER_SIZE];

// ── Board struct ──────────────────────────────────────────
pub struct Board {
    pub front_capture: InputCapture<'static, peripherals::TIM2>,
    pub rear_capture: InputCapture<'static, peripherals::TIM3>,
    pub engine_capture: InputCapture<'static, peripherals::TIM1>,
    pub serial_rx: RingBufferedUartRx<'static>,
    pub serial_sink: UartSink,
    pub adc: AdcWindow,
    pub pot_bus: I2cWiperBus,
    pub flash: FlashStore,
}

impl Board {
    pub fn init() -> Self {
        // HSI/2 * 6 = 24 MHz system and peripheral clock; the capture tick
        // rates below assume it.
        let mut config = Config::default();
        config.rcc.hsi = true;
        config.rcc.pll = Some(rcc::Pll {
            src: rcc::PllSource::HSI_DIV2,
            prediv: rcc::PllPreDiv::DIV1,
            mul: rcc::PllMul::MUL6,
        });
        config.rcc.sys = rcc::Sysclk::PLL1_P;
        let p = embassy_stm32::init(config);

        // Wheel pickups count at 100 kHz, engine pickup at 400 kHz.
        let front_pin = CapturePin::new_ch1(p.PA0, Pull::None);
        let front_capture = InputCapture::new(
            p.TIM2,
            Some(front_pin),
            None,
            None,
            None,
            Irqs,
            Hertz(PCLK_HZ / SPEED_TIMER_PSC),
            Default::default(),
        );

        let rear_pin = CapturePin::new_ch1(p.PA6, Pull::None);
        let rear_capture = InputCapture::new(
            p.TIM3,
            Some(rear_pin),
            None,
            None,
            None,
            Irqs,
            Hertz(PCLK_HZ / SPEED_TIMER_PSC),
            Default::default(),
        );

        let engine_pin = CapturePin::new_ch1(p.PA8, Pull::None);
        let engine_capture = InputCapture::new(
            p.TIM1,
            Some(engine_pin),
            None,
            None,
            None,
            Irqs,
            Hertz(PCLK_HZ / RPM_TIMER_PSC),
            Default::default(),
        );

        let mut us_cfg = UsartConfig::default();
        us_cfg.baudrate = UART_BAUDRATE;
        let uart = Uart::new(
            p.USART1, p.PA10, p.PA9, Irqs, p.DMA1_CH2, p.DMA1_CH3, us_cfg,
        )
        .unwrap();
        let (tx, rx) = uart.split();
        // DMA-circular RX driver
        #[allow(static_mut_refs)]
        let serial_rx = rx.into_ring_buffered(unsafe { &mut SERIAL_DMA_BUF });

        // Strain gauge on PA1; the other window slots sample the adjacent
        // analog inputs.
        let adc = AdcWindow {
            adc: Adc::new(p.ADC, Irqs),
            channels: [
                p.PA1.degrade_adc(),
                p.PA4.degrade_adc(),
                p.PA5.degrade_adc(),
                p.PB0.degrade_adc(),
            ],
        };

        let pot_bus = I2cWiperBus::init(p.I2C1);

        Self {
            front_capture,
            rear_capture,
            engine_capture,
            serial_rx,
            serial_sink: UartSink { tx },
            adc,
            pot_bus,
            flash: FlashStore::new(Flash::new_blocking(p.FLASH)),
        }
    }
}

/// Host-link transmit half.
pub struct UartSink {
    tx: UartTx<'static, Async>,
}

impl ResponseSink for UartSink {
    async fn send(&mut self, data: &[u8]) -> Result<(), SinkError> {
        self.tx.write(data).await.map_err(|_| SinkError)
    }
}

/// Round-robin window over four analog inputs. The gauge sits on channel 0,
/// so it lands on every fourth window slot.
pub struct AdcWindow {
    adc: Adc<'static, peripherals::ADC>,
    channels: [AnyAdcChannel<peripherals::ADC>; 4],
}

impl SampleSource for AdcWindow {
    async fn fill(&mut self, window: &mut [u16; crate::config::SAMPLE_WINDOW_LEN]) {
        for (i, slot) in window.iter_mut().enumerate() {
            *slot = self
                .adc
                .read(&mut self.channels[i % self.channels.len()])
                .await;
        }
    }
}

/// Register-level I2C1 master. The potentiometer driver needs per-byte
/// readiness checks under its own poll budget, which the DMA-based HAL
/// driver does not expose.
pub struct I2cWiperBus {
    _peri: peripherals::I2C1,
}

impl I2cWiperBus {
    /// 100 kHz standard mode from the 24 MHz kernel clock:
    /// presc 5 (250 ns tick), SCLL 20 ticks, SCLH 16 ticks.
    const TIMING: (u8, u8, u8, u8, u8) = (5, 4, 2, 0x0F, 0x13);

    fn init(peri: peripherals::I2C1) -> Self {
        // SCL = PB6, SDA = PB7: AF1, open drain.
        let gpio = pac::GPIOB;
        gpio.afr(0).modify(|w| {
            w.set_afr(6, 1);
            w.set_afr(7, 1);
        });
        gpio.otyper().modify(|w| w.0 |= (1 << 6) | (1 << 7));
        gpio.moder().modify(|w| {
            w.0 = (w.0 & !(0b1111 << 12)) | (0b1010 << 12);
        });

        // I2C1EN
        pac::RCC.apb1enr().modify(|w| w.0 |= 1 << 21);

        let i2c = pac::I2C1;
        let (presc, scldel, sdadel, sclh, scll) = Self::TIMING;
        i2c.timingr().write(|w| {
            w.set_presc(presc);
            w.set_scldel(scldel);
            w.set_sdadel(sdadel);
            w.set_sclh(sclh);
            w.set_scll(scll);
        });
        i2c.cr1().modify(|w| w.set_pe(true));

        Self { _peri: peri }
    }

    fn start(&mut self, addr: u8, len: usize, dir: pac::i2c::vals::Dir) {
        let i2c = pac::I2C1;
        i2c.icr().write(|w| {
            w.set_stopcf(true);
            w.set_nackcf(true);
        });
        i2c.cr2().modify(|w| {
            w.set_sadd(u16::from(addr) << 1);
            w.set_nbytes(len as u8);
            w.set_dir(dir);
            w.set_autoend(true);
            w.set_start(true);
        });
    }
}

impl WiperBus for I2cWiperBus {
    fn begin_write(&mut self, addr: u8, len: usize) {
        self.start(addr, len, pac::i2c::vals::Dir::WRITE);
    }

    fn begin_read(&mut self, addr: u8, len: usize) {
        self.start(addr, len, pac::i2c::vals::Dir::READ);
    }

    fn load_tx(&mut self, byte: u8) {
        pac::I2C1.txdr().write(|w| w.set_txdata(byte));
    }

    fn tx_complete(&mut self) -> bool {
        let isr = pac::I2C1.isr().read();
        isr.txis() || isr.stopf()
    }

    fn rx_ready(&mut self) -> bool {
        pac::I2C1.isr().read().rxne()
    }

    fn take_rx(&mut self) -> u8 {
        pac::I2C1.rxdr().read().rxdata()
    }

    async fn poll_delay(&mut self) {
        Timer::after_micros(WIPER_POLL_DELAY_US).await;
    }
}
