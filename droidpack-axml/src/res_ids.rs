//! Fixed attribute metadata for the `android:` namespace.
//!
//! Binary XML carries a resource map chunk that ties string pool entries to
//! the framework's attribute resource IDs. Android locates attributes through
//! those IDs rather than by name, so any attribute name missing from this
//! table is invisible to the OS.

/// Namespace URI that activates resource IDs and typed values for an attribute.
pub const ANDROID_NS_URI: &str = "http://schemas.android.com/apk/res/android";

/// Resource ID for an `android:` attribute name, from the framework's
/// public `android.R.attr` constants. Returns `None` for names the encoder
/// does not know.
pub fn resource_id(local_name: &str) -> Option<u32> {
    Some(match local_name {
        "label" => 0x0101_0001,
        "name" => 0x0101_0003,
        "hasCode" => 0x0101_000c,
        "debuggable" => 0x0101_000f,
        "configChanges" => 0x0101_001f,
        "value" => 0x0101_0024,
        "minSdkVersion" => 0x0101_020c,
        "versionCode" => 0x0101_021b,
        "versionName" => 0x0101_021c,
        _ => return None,
    })
}

/// Folds a pipe-separated `android:configChanges` value into its bitmask.
/// Unrecognized tokens contribute nothing.
pub(crate) fn config_changes_bits(value: &str) -> u32 {
    value.split('|').fold(0, |mask, token| mask | config_change_bit(token))
}

fn config_change_bit(token: &str) -> u32 {
    match token {
        "mcc" => 0x0001,
        "mnc" => 0x0002,
        "locale" => 0x0004,
        "touchscreen" => 0x0008,
        "keyboard" => 0x0010,
        "keyboardHidden" => 0x0020,
        "navigation" => 0x0040,
        "orientation" => 0x0080,
        "screenLayout" => 0x0100,
        "uiMode" => 0x0200,
        "screenSize" => 0x0400,
        "smallestScreenSize" => 0x0800,
        "layoutDirection" => 0x2000,
        "fontScale" => 0x4000_0000,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_attribute_ids() {
        assert_eq!(resource_id("versionCode"), Some(0x0101_021b));
        assert_eq!(resource_id("name"), Some(0x0101_0003));
        assert_eq!(resource_id("package"), None);
    }

    #[test]
    fn config_changes_combine() {
        assert_eq!(config_changes_bits("orientation|keyboardHidden"), 0xa0);
        assert_eq!(config_changes_bits("mcc|mnc|locale"), 0x07);
        assert_eq!(config_changes_bits("fontScale"), 0x4000_0000);
    }

    #[test]
    fn unknown_config_changes_token_contributes_zero() {
        assert_eq!(config_changes_bits("orientation|nonsense"), 0x80);
        assert_eq!(config_changes_bits("nonsense"), 0);
    }
}
