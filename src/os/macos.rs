use core_foundation::base::TCFType;
use core_foundation::boolean::CFBoolean;
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::string::{CFString, CFStringRef};
use log::warn;

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    static kAXTrustedCheckOptionPrompt: CFStringRef;
    fn AXIsProcessTrustedWithOptions(options: CFDictionaryRef) -> bool;
}

/// Whether this process may post keyboard events. When it may not, macOS shows its own dialog
/// pointing the user to the accessibility settings.
fn trusted_for_accessibility() -> bool {
    unsafe {
        let prompt = CFString::wrap_under_get_rule(kAXTrustedCheckOptionPrompt);
        let options: CFDictionary<CFString, CFBoolean> =
            CFDictionary::from_CFType_pairs(&[(prompt, CFBoolean::true_value())]);

        AXIsProcessTrustedWithOptions(options.as_concrete_TypeRef())
    }
}

pub fn warn_without_accessibility_access() {
    if trusted_for_accessibility() {
        return;
    }

    warn!(
        "No \"accessibility\" access, so the PTT key can not be held. Enable ptt-hotkey (or the \
        terminal running it) under System Settings > Privacy & Security > Accessibility, then \
        restart ptt-hotkey."
    );
}
