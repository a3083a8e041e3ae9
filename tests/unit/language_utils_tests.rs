/*!
 * Tests for language utility functions
 */

use epubwai::language_utils::{
    get_language_name, is_rtl, language_class, language_codes_match, normalize_to_part1_or_part2t,
    normalize_to_part2t, validate_language_code, LanguageClass, LanguageCodeType,
};

/// Test validation of language codes
#[test]
fn test_validateLanguageCode_withValidCodes_shouldReturnCorrectType() {
    assert!(matches!(validate_language_code("en").unwrap(), LanguageCodeType::Part1));
    assert!(matches!(validate_language_code("fra").unwrap(), LanguageCodeType::Part2T));
    assert!(matches!(validate_language_code("ger").unwrap(), LanguageCodeType::Part2B));

    // Region subtags, whitespace and case
    assert!(matches!(validate_language_code("pt-BR").unwrap(), LanguageCodeType::Part1));
    assert!(matches!(validate_language_code("zh_TW").unwrap(), LanguageCodeType::Part1));
    assert!(matches!(validate_language_code(" EN ").unwrap(), LanguageCodeType::Part1));

    assert!(validate_language_code("xyz").is_err());
    assert!(validate_language_code("123").is_err());
    assert!(validate_language_code("e").is_err());
}

/// Test normalization of language codes to ISO 639-2/T format
#[test]
fn test_normalizeToPart2t_withValidCodes_shouldNormalizeCorrectly() {
    assert_eq!(normalize_to_part2t("en").unwrap(), "eng");
    assert_eq!(normalize_to_part2t("fre").unwrap(), "fra");
    assert_eq!(normalize_to_part2t("ger").unwrap(), "deu");
    assert_eq!(normalize_to_part2t("pt-PT").unwrap(), "por");
    assert!(normalize_to_part2t("klingon").is_err());

    assert_eq!(normalize_to_part1_or_part2t("fra").unwrap(), "fr");
    assert_eq!(normalize_to_part1_or_part2t("ar-EG").unwrap(), "ar");
}

/// Test matching of different language code formats
#[test]
fn test_languageCodesMatch_shouldCompareAcrossFormats() {
    assert!(language_codes_match("en", "eng"));
    assert!(language_codes_match("fr", "fre"));
    assert!(language_codes_match("pt-BR", "por"));
    assert!(!language_codes_match("en", "fr"));
    assert!(!language_codes_match("xx", "xx"));
}

#[test]
fn test_getLanguageName_shouldReturnEnglishName() {
    assert_eq!(get_language_name("de").unwrap(), "German");
    assert_eq!(get_language_name("ja").unwrap(), "Japanese");
    assert!(get_language_name("qqq").is_err());
}

#[test]
fn test_languageClass_shouldBandScriptsByDensity() {
    for code in ["zh", "ja", "ko", "th", "hi", "zh-CN"] {
        assert_eq!(language_class(code), LanguageClass::Compact, "{code}");
    }
    for code in ["fr", "de", "ar", "ru", "not-a-code"] {
        assert_eq!(language_class(code), LanguageClass::Standard, "{code}");
    }
}

#[test]
fn test_isRtl_shouldDetectRightToLeftScripts() {
    assert!(is_rtl("ar"));
    assert!(is_rtl("he"));
    assert!(is_rtl("fa-IR"));
    assert!(is_rtl("urd"));
    assert!(!is_rtl("en"));
    assert!(!is_rtl("ja"));
    assert!(!is_rtl(""));
}
