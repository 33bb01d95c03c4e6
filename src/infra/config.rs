//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::geometry::ImageGeometry;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedTransport {
    Tcp,
    Mqtt,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique site identifier (e.g. "experience-center")
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "showfloor".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_transport")]
    pub transport: FeedTransport,
    /// NDJSON feed address (tcp transport)
    #[serde(default = "default_tcp_addr")]
    pub tcp_addr: String,
    #[serde(default = "default_mqtt_host")]
    pub mqtt_host: String,
    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,
    #[serde(default = "default_mqtt_topic")]
    pub mqtt_topic: String,
    #[serde(default)]
    pub mqtt_username: Option<String>,
    #[serde(default)]
    pub mqtt_password: Option<String>,
    /// Reconnect backoff base delay (doubles per consecutive failure)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Reconnect backoff cap
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Bounded reading-batch queue between stream and tracker
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            transport: default_feed_transport(),
            tcp_addr: default_tcp_addr(),
            mqtt_host: default_mqtt_host(),
            mqtt_port: default_mqtt_port(),
            mqtt_topic: default_mqtt_topic(),
            mqtt_username: None,
            mqtt_password: None,
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            queue_size: default_queue_size(),
        }
    }
}

fn default_feed_transport() -> FeedTransport {
    FeedTransport::Tcp
}

fn default_tcp_addr() -> String {
    "127.0.0.1:7070".to_string()
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_topic() -> String {
    "experience/readings/#".to_string()
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_cap_ms() -> u64 {
    30_000
}

fn default_queue_size() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Reading age (ms) past which a device counts as disconnected
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
    /// Staleness sweep period (ms)
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Numeric values retained per device
    #[serde(default = "default_history_len")]
    pub history_len: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: default_stale_after_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            history_len: default_history_len(),
        }
    }
}

fn default_stale_after_ms() -> u64 {
    12_000
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

fn default_history_len() -> usize {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeatmapConfig {
    /// Gradient color ramp, low to high, as #rrggbb strings
    #[serde(default = "default_heatmap_ramp")]
    pub ramp: Vec<String>,
    /// Overlay opacity
    #[serde(default = "default_heatmap_alpha")]
    pub alpha: f64,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self { ramp: default_heatmap_ramp(), alpha: default_heatmap_alpha() }
    }
}

fn default_heatmap_ramp() -> Vec<String> {
    ["#0000ff", "#00ffff", "#00ff00", "#ffff00", "#ff0000"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_heatmap_alpha() -> f64 {
    0.6
}

/// Static floorplan geometry for the demo runner
///
/// Real deployments receive geometry from the layout collaborator at
/// runtime; the demo can pin it in config instead.
#[derive(Debug, Clone, Deserialize)]
pub struct FloorplanConfig {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default = "default_scale")]
    pub scale_x: f64,
    #[serde(default = "default_scale")]
    pub scale_y: f64,
    #[serde(default)]
    pub physical_width_cm: Option<f64>,
    #[serde(default)]
    pub physical_height_cm: Option<f64>,
}

fn default_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub heatmap: HeatmapConfig,
    #[serde(default)]
    pub floorplan: Option<FloorplanConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    feed_transport: FeedTransport,
    feed_tcp_addr: String,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    backoff_base_ms: u64,
    backoff_cap_ms: u64,
    queue_size: usize,
    stale_after_ms: u64,
    sweep_interval_ms: u64,
    history_len: usize,
    heatmap_ramp: Vec<String>,
    heatmap_alpha: f64,
    floorplan: Option<FloorplanConfig>,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            site_id: toml_config.site.id,
            feed_transport: toml_config.feed.transport,
            feed_tcp_addr: toml_config.feed.tcp_addr,
            mqtt_host: toml_config.feed.mqtt_host,
            mqtt_port: toml_config.feed.mqtt_port,
            mqtt_topic: toml_config.feed.mqtt_topic,
            mqtt_username: toml_config.feed.mqtt_username,
            mqtt_password: toml_config.feed.mqtt_password,
            backoff_base_ms: toml_config.feed.backoff_base_ms,
            backoff_cap_ms: toml_config.feed.backoff_cap_ms,
            queue_size: toml_config.feed.queue_size,
            stale_after_ms: toml_config.tracker.stale_after_ms,
            sweep_interval_ms: toml_config.tracker.sweep_interval_ms,
            history_len: toml_config.tracker.history_len,
            heatmap_ramp: toml_config.heatmap.ramp,
            heatmap_alpha: toml_config.heatmap.alpha,
            floorplan: toml_config.floorplan,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: config_file.to_string(),
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        // Check for --config argument
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        // Check CONFIG_FILE environment variable
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        // Default to dev.toml
        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Static demo geometry, when pinned in config
    pub fn floorplan_geometry(&self) -> Option<ImageGeometry> {
        self.floorplan.as_ref().map(|f| ImageGeometry {
            left: f.left,
            top: f.top,
            width: f.width,
            height: f.height,
            scale_x: f.scale_x,
            scale_y: f.scale_y,
            physical_width_cm: f.physical_width_cm,
            physical_height_cm: f.physical_height_cm,
        })
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn feed_transport(&self) -> &FeedTransport {
        &self.feed_transport
    }

    pub fn feed_tcp_addr(&self) -> &str {
        &self.feed_tcp_addr
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_topic(&self) -> &str {
        &self.mqtt_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn backoff_base_ms(&self) -> u64 {
        self.backoff_base_ms
    }

    pub fn backoff_cap_ms(&self) -> u64 {
        self.backoff_cap_ms
    }

    pub fn queue_size(&self) -> usize {
        self.queue_size
    }

    pub fn stale_after_ms(&self) -> u64 {
        self.stale_after_ms
    }

    pub fn sweep_interval_ms(&self) -> u64 {
        self.sweep_interval_ms
    }

    pub fn history_len(&self) -> usize {
        self.history_len
    }

    pub fn heatmap_ramp(&self) -> &[String] {
        &self.heatmap_ramp
    }

    pub fn heatmap_alpha(&self) -> f64 {
        self.heatmap_alpha
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "showfloor");
        assert_eq!(config.feed_transport(), &FeedTransport::Tcp);
        assert_eq!(config.feed_tcp_addr(), "127.0.0.1:7070");
        assert_eq!(config.mqtt_port(), 1883);
        assert_eq!(config.stale_after_ms(), 12_000);
        assert_eq!(config.sweep_interval_ms(), 1000);
        assert_eq!(config.history_len(), 30);
        assert_eq!(config.backoff_base_ms(), 1000);
        assert_eq!(config.backoff_cap_ms(), 30_000);
        assert_eq!(config.heatmap_ramp().len(), 5);
        assert!(config.floorplan_geometry().is_none());
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["showfloor".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/dev.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> =
            vec!["showfloor".to_string(), "--config".to_string(), "config/retail.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/retail.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["showfloor".to_string(), "--config=config/warehouse.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/warehouse.toml");
    }

    #[test]
    fn test_floorplan_geometry_mapping() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [floorplan]
            left = 10.0
            top = 20.0
            width = 640.0
            height = 480.0
            physical_width_cm = 1200.0
            physical_height_cm = 900.0
            "#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "test");
        let geometry = config.floorplan_geometry().unwrap();
        assert_eq!(geometry.left, 10.0);
        assert_eq!(geometry.scale_x, 1.0);
        assert!(geometry.has_physical_dims());
    }
}
