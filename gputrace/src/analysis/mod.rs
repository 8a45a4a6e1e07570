pub mod hotspot_analyzer;

pub use hotspot_analyzer::{analyze_hotspots, FunctionHotspot, HotspotStats};
