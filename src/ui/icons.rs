//! Shared UI icons and emojis.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// Delivery indicators
pub static LIVE: Emoji<'_, '_> = Emoji("📡 ", "[LIVE]");
pub static PIVOT: Emoji<'_, '_> = Emoji("🔄 ", "[POLL]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
