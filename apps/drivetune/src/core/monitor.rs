//! Telemetry monitor
//!
//! One recurring polling task reads every active channel's registers each
//! tick, decodes the words and appends them to bounded per-channel
//! histories. A tick either completes or is skipped whole; a failed read
//! never stops the loop.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use drive_catalog::{ChannelDef, SessionSettings};
use drive_link::{aggregate_registers, codec, ReadRange, RegisterLink};
use errors::DriveResult;
use rand::Rng;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Samples kept per channel before the oldest is overwritten
pub const HISTORY_CAPACITY: usize = 1000;

/// Default polling tick
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Bounded rolling sample history for one channel.
///
/// Append is O(1): at capacity the oldest sample is dropped in place, the
/// buffer never reallocates or copies.
#[derive(Debug, Clone)]
pub struct ChannelBuffer {
    samples: VecDeque<i64>,
    capacity: usize,
}

impl ChannelBuffer {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn append(&mut self, value: i64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Most recent sample, if any
    pub fn latest(&self) -> Option<i64> {
        self.samples.back().copied()
    }

    /// Snapshot of the history, newest first (relative position 0 is the
    /// latest sample)
    pub fn snapshot(&self) -> Vec<i64> {
        self.samples.iter().rev().copied().collect()
    }
}

impl Default for ChannelBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// A channel definition together with its mutable monitoring state
#[derive(Debug, Clone)]
struct MonitoredChannel {
    def: ChannelDef,
    active: bool,
    buffer: ChannelBuffer,
}

/// Monitor statistics, readable while polling runs
#[derive(Debug, Clone, Default)]
pub struct MonitorStats {
    pub total_ticks: u64,
    pub successful_ticks: u64,
    pub failed_ticks: u64,
    pub samples_appended: u64,
    pub last_tick_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Telemetry polling engine
///
/// Two states: idle and polling. While polling, a single tokio task runs
/// one read cycle per tick; missed ticks are skipped rather than bursted,
/// so cycles never overlap. Without a link the engine feeds the buffers
/// small randomized values, which keeps monitoring usable as a demo when
/// no drive is attached.
pub struct MonitorEngine {
    link: Option<Arc<dyn RegisterLink>>,
    tick_interval: Duration,
    channels: Arc<RwLock<Vec<MonitoredChannel>>>,
    stats: Arc<RwLock<MonitorStats>>,
    is_running: Arc<RwLock<bool>>,
    task_handle: RwLock<Option<JoinHandle<()>>>,
}

impl MonitorEngine {
    /// Create an idle engine over the given channel definitions. All
    /// channels start inactive; `link = None` selects the disconnected
    /// demo mode.
    pub fn new(
        link: Option<Arc<dyn RegisterLink>>,
        definitions: Vec<ChannelDef>,
        tick_interval: Duration,
    ) -> Self {
        let channels = definitions
            .into_iter()
            .map(|def| MonitoredChannel {
                def,
                active: false,
                buffer: ChannelBuffer::new(),
            })
            .collect();

        Self {
            link,
            tick_interval,
            channels: Arc::new(RwLock::new(channels)),
            stats: Arc::new(RwLock::new(MonitorStats::default())),
            is_running: Arc::new(RwLock::new(false)),
            task_handle: RwLock::new(None),
        }
    }

    /// Toggle a channel by name. Returns false if the name is unknown.
    pub async fn set_active(&self, name: &str, active: bool) -> bool {
        let mut channels = self.channels.write().await;
        match channels.iter_mut().find(|c| c.def.name == name) {
            Some(channel) => {
                channel.active = active;
                true
            },
            None => false,
        }
    }

    /// Apply the persisted per-channel active flags.
    pub async fn apply_settings(&self, settings: &SessionSettings) {
        let mut channels = self.channels.write().await;
        for channel in channels.iter_mut() {
            channel.active = settings.channel(&channel.def.name).active;
        }
    }

    pub async fn active_channel_names(&self) -> Vec<String> {
        self.channels
            .read()
            .await
            .iter()
            .filter(|c| c.active)
            .map(|c| c.def.name.clone())
            .collect()
    }

    /// Start polling. A no-op if the engine is already polling.
    pub async fn start(&self) {
        {
            let mut running = self.is_running.write().await;
            if *running {
                return;
            }
            *running = true;
        }

        let link = self.link.clone();
        let channels = Arc::clone(&self.channels);
        let stats = Arc::clone(&self.stats);
        let is_running = Arc::clone(&self.is_running);
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if !*is_running.read().await {
                    break;
                }
                run_tick(&link, &channels, &stats).await;
            }
        });

        *self.task_handle.write().await = Some(handle);
        info!(
            "monitor started, tick interval {} ms",
            self.tick_interval.as_millis()
        );
    }

    /// Stop polling and wait for the in-flight tick to finish. Idempotent.
    pub async fn stop(&self) {
        {
            let mut running = self.is_running.write().await;
            if !*running {
                return;
            }
            *running = false;
        }

        if let Some(handle) = self.task_handle.write().await.take() {
            let _ = handle.await;
        }
        info!("monitor stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Snapshot of a channel's history, newest first.
    pub async fn history(&self, name: &str) -> Option<Vec<i64>> {
        self.channels
            .read()
            .await
            .iter()
            .find(|c| c.def.name == name)
            .map(|c| c.buffer.snapshot())
    }

    /// Most recent sample of a channel.
    pub async fn latest(&self, name: &str) -> Option<i64> {
        self.channels
            .read()
            .await
            .iter()
            .find(|c| c.def.name == name)
            .and_then(|c| c.buffer.latest())
    }

    pub async fn stats(&self) -> MonitorStats {
        self.stats.read().await.clone()
    }
}

/// One read cycle: aggregate the active channels' registers, read every
/// range, then fan the words back out into the channel buffers. Any range
/// failure abandons the whole tick's update.
async fn run_tick(
    link: &Option<Arc<dyn RegisterLink>>,
    channels: &RwLock<Vec<MonitoredChannel>>,
    stats: &RwLock<MonitorStats>,
) {
    let requested: Vec<u16> = channels
        .read()
        .await
        .iter()
        .filter(|c| c.active)
        .flat_map(|c| c.def.registers.iter().copied())
        .collect();
    if requested.is_empty() {
        return;
    }

    let ranges = aggregate_registers(&requested);
    let mut values: HashMap<u16, u16> = HashMap::new();
    for range in &ranges {
        let words = match read_range(link, range).await {
            Ok(words) => words,
            Err(e) => {
                warn!(
                    "read of 0x{:04X}+{} failed, skipping tick: {}",
                    range.start, range.count, e
                );
                record_failure(stats, &e.to_string()).await;
                return;
            },
        };
        for (address, word) in range.addresses().zip(words) {
            values.insert(address, word);
        }
    }

    let mut appended = 0u64;
    {
        let mut channels = channels.write().await;
        for channel in channels.iter_mut().filter(|c| c.active) {
            if let Some(value) = decode_channel(&channel.def, &values) {
                channel.buffer.append(value);
                appended += 1;
            }
        }
    }
    debug!("tick appended {} samples", appended);
    record_success(stats, appended).await;
}

async fn read_range(
    link: &Option<Arc<dyn RegisterLink>>,
    range: &ReadRange,
) -> DriveResult<Vec<u16>> {
    match link {
        Some(link) => link.read_registers(range.start, range.count).await,
        // Disconnected demo state: small randomized words keep the
        // channels moving without a drive attached.
        None => {
            let mut rng = rand::thread_rng();
            Ok((0..range.count).map(|_| rng.gen_range(0..=200)).collect())
        },
    }
}

/// Decode one channel from the consolidated address→word map.
fn decode_channel(def: &ChannelDef, values: &HashMap<u16, u16>) -> Option<i64> {
    match def.registers.as_slice() {
        [address] => values
            .get(address)
            .map(|&raw| codec::decode_u16(raw, def.signed)),
        [hi, lo] => Some(codec::decode_u32(*values.get(hi)?, *values.get(lo)?)),
        _ => None,
    }
}

async fn record_success(stats: &RwLock<MonitorStats>, appended: u64) {
    let mut stats = stats.write().await;
    stats.total_ticks += 1;
    stats.successful_ticks += 1;
    stats.samples_appended += appended;
    stats.last_tick_time = Some(Utc::now());
}

async fn record_failure(stats: &RwLock<MonitorStats>, error: &str) {
    let mut stats = stats.write().await;
    stats.total_ticks += 1;
    stats.failed_ticks += 1;
    stats.last_error = Some(error.to_string());
    stats.last_tick_time = Some(Utc::now());
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::testutil::MockLink;

    // ========== ChannelBuffer tests ==========

    #[test]
    fn test_buffer_starts_empty() {
        let buffer = ChannelBuffer::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.latest(), None);
        assert!(buffer.snapshot().is_empty());
    }

    #[test]
    fn test_buffer_first_append_is_sole_sample() {
        let mut buffer = ChannelBuffer::new();
        buffer.append(42);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.latest(), Some(42));
        assert_eq!(buffer.snapshot(), vec![42]);
    }

    #[test]
    fn test_buffer_snapshot_is_newest_first() {
        let mut buffer = ChannelBuffer::new();
        for value in [1, 2, 3] {
            buffer.append(value);
        }
        assert_eq!(buffer.snapshot(), vec![3, 2, 1]);
    }

    #[test]
    fn test_buffer_evicts_oldest_at_capacity() {
        let mut buffer = ChannelBuffer::new();
        for value in 0..=1000i64 {
            buffer.append(value);
        }
        assert_eq!(buffer.len(), 1000);
        let snapshot = buffer.snapshot();
        // 0 was evicted; the newest 1000 values survive in order
        assert_eq!(snapshot[0], 1000);
        assert_eq!(*snapshot.last().unwrap(), 1);
    }

    #[test]
    fn test_buffer_never_shrinks() {
        let mut buffer = ChannelBuffer::with_capacity(3);
        for value in 0..10 {
            buffer.append(value);
            assert!(buffer.len() <= 3);
        }
        assert_eq!(buffer.len(), 3);
    }

    // ========== decode_channel tests ==========

    #[test]
    fn test_decode_single_register_channel() {
        let def = ChannelDef::new("Speed Feedback", vec![0x47], true);
        let values = HashMap::from([(0x47u16, 0xFF6Au16)]);
        assert_eq!(decode_channel(&def, &values), Some(-150));

        let unsigned = ChannelDef::new("Bus Voltage", vec![0x49], false);
        let values = HashMap::from([(0x49u16, 0xFF6Au16)]);
        assert_eq!(decode_channel(&unsigned, &values), Some(0xFF6A));
    }

    #[test]
    fn test_decode_composite_channel_high_word_first() {
        let def = ChannelDef::new("Position Error", vec![0x44, 0x45], true);
        let values = HashMap::from([(0x44u16, 0xFFFFu16), (0x45u16, 0xFF6Au16)]);
        assert_eq!(decode_channel(&def, &values), Some(-150));
    }

    #[test]
    fn test_decode_missing_register_yields_none() {
        let def = ChannelDef::new("Position Error", vec![0x44, 0x45], true);
        let values = HashMap::from([(0x44u16, 0x0001u16)]);
        assert_eq!(decode_channel(&def, &values), None);
    }

    // ========== MonitorEngine tests ==========

    fn test_channels() -> Vec<ChannelDef> {
        vec![
            ChannelDef::new("Position Error", vec![0x44, 0x45], true),
            ChannelDef::new("Speed Feedback", vec![0x47], true),
            ChannelDef::new("Bus Voltage", vec![0x49], false),
        ]
    }

    #[tokio::test]
    async fn test_idle_engine_has_no_ticks() {
        let link = Arc::new(MockLink::new());
        let engine = MonitorEngine::new(
            Some(link as Arc<dyn RegisterLink>),
            test_channels(),
            Duration::from_millis(1),
        );
        assert!(!engine.is_running().await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(engine.stats().await.total_ticks, 0);
    }

    #[tokio::test]
    async fn test_no_active_channels_means_noop_ticks() {
        let link = Arc::new(MockLink::new());
        let engine = MonitorEngine::new(
            Some(Arc::clone(&link) as Arc<dyn RegisterLink>),
            test_channels(),
            Duration::from_millis(1),
        );
        engine.start().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        engine.stop().await;

        assert_eq!(engine.stats().await.total_ticks, 0);
        assert!(link.read_calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_polling_merges_reads_and_fills_buffers() {
        let link = Arc::new(MockLink::with_registers([
            (0x44u16, 0xFFFFu16),
            (0x45, 0xFF6A),
            (0x47, 0x0064),
        ]));
        let engine = MonitorEngine::new(
            Some(Arc::clone(&link) as Arc<dyn RegisterLink>),
            test_channels(),
            Duration::from_millis(1),
        );
        engine.set_active("Position Error", true).await;
        engine.set_active("Speed Feedback", true).await;

        engine.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.stop().await;

        // 0x44,0x45,0x47 merge into one read (delta 2 within gap tolerance)
        let calls = link.read_calls.lock().await;
        assert!(!calls.is_empty());
        assert!(calls.iter().all(|&(start, count)| (start, count) == (0x44, 4)));
        drop(calls);

        assert_eq!(engine.latest("Position Error").await, Some(-150));
        assert_eq!(engine.latest("Speed Feedback").await, Some(100));
        // Inactive channel untouched
        assert_eq!(engine.history("Bus Voltage").await.unwrap().len(), 0);

        let stats = engine.stats().await;
        assert!(stats.successful_ticks > 0);
        assert_eq!(stats.failed_ticks, 0);
    }

    #[tokio::test]
    async fn test_disconnected_mode_synthesizes_samples() {
        let engine = MonitorEngine::new(None, test_channels(), Duration::from_millis(1));
        engine.set_active("Speed Feedback", true).await;
        engine.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.stop().await;

        let history = engine.history("Speed Feedback").await.unwrap();
        assert!(!history.is_empty());
        assert!(history.iter().all(|&v| (0..=200).contains(&v)));
    }

    #[tokio::test]
    async fn test_read_failure_skips_tick_but_keeps_polling() {
        let link = Arc::new(MockLink::with_registers([(0x47u16, 0x0064u16)]));
        let engine = MonitorEngine::new(
            Some(Arc::clone(&link) as Arc<dyn RegisterLink>),
            test_channels(),
            Duration::from_millis(1),
        );
        engine.set_active("Speed Feedback", true).await;
        engine.start().await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Inject a device fault mid-run
        link.set_failing(true);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let frozen_len = engine.history("Speed Feedback").await.unwrap().len();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Still polling, buffers unchanged while the device is down
        assert!(engine.is_running().await);
        assert_eq!(
            engine.history("Speed Feedback").await.unwrap().len(),
            frozen_len
        );
        let stats = engine.stats().await;
        assert!(stats.failed_ticks > 0);
        assert!(stats.last_error.is_some());

        // Device recovers: updates resume on subsequent ticks
        link.set_failing(false);
        tokio::time::sleep(Duration::from_millis(30)).await;
        engine.stop().await;
        assert!(engine.history("Speed Feedback").await.unwrap().len() > frozen_len);
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let engine = MonitorEngine::new(None, test_channels(), Duration::from_millis(1));
        engine.stop().await; // stop while idle is a no-op
        engine.start().await;
        engine.start().await; // second start is a no-op
        assert!(engine.is_running().await);
        engine.stop().await;
        engine.stop().await;
        assert!(!engine.is_running().await);
    }

    #[tokio::test]
    async fn test_apply_settings_activates_persisted_channels() {
        let mut settings = SessionSettings::default();
        settings.channel_mut("Bus Voltage").active = true;

        let engine = MonitorEngine::new(None, test_channels(), Duration::from_millis(1));
        engine.apply_settings(&settings).await;
        assert_eq!(
            engine.active_channel_names().await,
            vec!["Bus Voltage".to_string()]
        );
    }
}
