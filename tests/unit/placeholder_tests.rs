/*!
 * Tests for placeholder protection, restoration and quality banding
 */

use proptest::prelude::*;

use epubwai::language_utils::{language_class, LanguageClass};
use epubwai::translation::{PlaceholderGuard, PlaceholderKind};

proptest! {
    #[test]
    fn test_protectRestore_withoutTranslation_shouldRoundTrip(
        text in "[A-Za-z ,.!?]{0,30}( [0-9]{1,5}([.,][0-9]{1,3})?)?( https://example\\.org/[a-z]{1,8})?( <em>[a-z ]{1,10}</em>)?( [a-z]{1,6}@mail\\.com)?( &amp; more)?"
    ) {
        let guard = PlaceholderGuard::new();
        let (masked, map) = guard.protect_text(0, &text);
        let restored = guard.restore(&masked, &map);
        prop_assert!(restored.is_ok());
        prop_assert_eq!(restored.unwrap(), text);
    }
}

#[test]
fn test_restore_afterTranslation_shouldKeepEveryProtectedFragmentCount() {
    let guard = PlaceholderGuard::new();
    let source = "Read <b>this</b> at https://a.org/x and https://b.org/y, pages 12 and 345, or <i>mail</i> now.";
    let (masked, map) = guard.protect_text(3, source);

    assert_eq!(map.count(PlaceholderKind::Tag), 4);
    assert_eq!(map.count(PlaceholderKind::Url), 2);
    assert_eq!(map.count(PlaceholderKind::Number), 2);
    assert_eq!(map.segment_index, 3);
    assert!(!masked.contains("https://"));

    // A backend that rewrites the prose and moves tokens around
    let translated = masked
        .replace("Read", "Lisez")
        .replace(" at ", " sur ")
        .replace(" and ", " et ")
        .replace("or ", "ou ")
        .replace("now", "maintenant");
    let restored = guard.restore(&translated, &map).unwrap();

    assert_eq!(restored.matches('<').count(), 4);
    assert_eq!(restored.matches("https://").count(), 2);
    assert!(restored.contains("https://a.org/x"));
    assert!(restored.contains("https://b.org/y"));
    assert!(restored.contains("12") && restored.contains("345"));
    assert!(restored.starts_with("Lisez <b>this</b>"));
}

#[test]
fn test_protect_shouldNotMaskNumbersInsideUrlsOrEmails() {
    let guard = PlaceholderGuard::new();
    let source = "Write to bob2@mail.com or see https://x.org/page/42 on day 7";
    let (masked, map) = guard.protect_text(0, source);

    assert_eq!(masked, "Write to {EMAIL_0} or see {URL_0} on day {NUM_0}");
    assert_eq!(map.count(PlaceholderKind::Email), 1);
    assert_eq!(map.count(PlaceholderKind::Url), 1);
    assert_eq!(map.count(PlaceholderKind::Number), 1);
    assert_eq!(guard.restore(&masked, &map).unwrap(), source);
}

#[test]
fn test_validateQuality_withRatioPointThree_shouldDependOnLanguageClass() {
    let guard = PlaceholderGuard::new();
    let original = "abcdefghij abcdefghij";
    let translated = "abcdef";

    assert_eq!(language_class("zh"), LanguageClass::Compact);
    assert_eq!(language_class("fr"), LanguageClass::Standard);
    assert!(guard.validate_quality(original, translated, language_class("zh")));
    assert!(!guard.validate_quality(original, translated, language_class("fr")));
}

#[test]
fn test_validateQuality_withShortOrEmptyText_shouldOnlyRejectEmpty() {
    let guard = PlaceholderGuard::new();

    // Under ten visible characters the ratio is not checked
    assert!(guard.validate_quality("Yes", "Oui, absolument certainement", LanguageClass::Standard));
    assert!(!guard.validate_quality("Yes", "", LanguageClass::Standard));
    assert!(!guard.validate_quality("Yes", "<b></b>", LanguageClass::Compact));
}
