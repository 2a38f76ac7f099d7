//! Static charset/collation table.
//!
//! Collations are looked up by id (what the server reports in column
//! definitions and the handshake) or by name (what users configure). A bare
//! character-set name resolves to that character set's default collation.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::{Error, Result};

#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Collation {
    pub id: u16,
    pub name: &'static str,
    pub charset: &'static str,
    /// Name of the byte encoding used to transcode text in this collation
    pub encoding: &'static str,
}

impl Collation {
    /// The `binary` pseudo-collation; text in it is raw bytes.
    pub fn is_binary(&self) -> bool {
        self.id == BINARY.id
    }

    /// Whether the collation id fits the one-byte field of the handshake.
    pub fn fits_handshake(&self) -> bool {
        self.id <= 0xFF
    }

    pub fn handshake_id(&self) -> u8 {
        u8::try_from(self.id).unwrap_or(DEFAULT_COLLATION_ID as u8)
    }
}

/// `utf8mb4_unicode_ci`, used when no charset is configured.
pub const DEFAULT_COLLATION_ID: u16 = 224;

pub static BINARY: Collation = c(63, "binary", "binary", "binary");

const fn c(
    id: u16,
    name: &'static str,
    charset: &'static str,
    encoding: &'static str,
) -> Collation {
    Collation {
        id,
        name,
        charset,
        encoding,
    }
}

/// The first entry for each charset is its default collation.
static COLLATIONS: &[Collation] = &[
    c(1, "big5_chinese_ci", "big5", "big5"),
    c(84, "big5_bin", "big5", "big5"),
    c(3, "dec8_swedish_ci", "dec8", "dec8"),
    c(69, "dec8_bin", "dec8", "dec8"),
    c(4, "cp850_general_ci", "cp850", "cp850"),
    c(80, "cp850_bin", "cp850", "cp850"),
    c(6, "hp8_english_ci", "hp8", "hp8"),
    c(72, "hp8_bin", "hp8", "hp8"),
    c(7, "koi8r_general_ci", "koi8r", "koi8-r"),
    c(74, "koi8r_bin", "koi8r", "koi8-r"),
    c(8, "latin1_swedish_ci", "latin1", "latin1"),
    c(5, "latin1_german1_ci", "latin1", "latin1"),
    c(15, "latin1_danish_ci", "latin1", "latin1"),
    c(31, "latin1_german2_ci", "latin1", "latin1"),
    c(47, "latin1_bin", "latin1", "latin1"),
    c(48, "latin1_general_ci", "latin1", "latin1"),
    c(49, "latin1_general_cs", "latin1", "latin1"),
    c(94, "latin1_spanish_ci", "latin1", "latin1"),
    c(9, "latin2_general_ci", "latin2", "latin2"),
    c(2, "latin2_czech_cs", "latin2", "latin2"),
    c(21, "latin2_hungarian_ci", "latin2", "latin2"),
    c(27, "latin2_croatian_ci", "latin2", "latin2"),
    c(77, "latin2_bin", "latin2", "latin2"),
    c(10, "swe7_swedish_ci", "swe7", "swe7"),
    c(82, "swe7_bin", "swe7", "swe7"),
    c(11, "ascii_general_ci", "ascii", "ascii"),
    c(65, "ascii_bin", "ascii", "ascii"),
    c(12, "ujis_japanese_ci", "ujis", "euc-jp"),
    c(91, "ujis_bin", "ujis", "euc-jp"),
    c(13, "sjis_japanese_ci", "sjis", "shift_jis"),
    c(88, "sjis_bin", "sjis", "shift_jis"),
    c(16, "hebrew_general_ci", "hebrew", "iso-8859-8"),
    c(71, "hebrew_bin", "hebrew", "iso-8859-8"),
    c(18, "tis620_thai_ci", "tis620", "tis-620"),
    c(89, "tis620_bin", "tis620", "tis-620"),
    c(19, "euckr_korean_ci", "euckr", "euc-kr"),
    c(85, "euckr_bin", "euckr", "euc-kr"),
    c(22, "koi8u_general_ci", "koi8u", "koi8-u"),
    c(75, "koi8u_bin", "koi8u", "koi8-u"),
    c(24, "gb2312_chinese_ci", "gb2312", "gb2312"),
    c(86, "gb2312_bin", "gb2312", "gb2312"),
    c(25, "greek_general_ci", "greek", "iso-8859-7"),
    c(70, "greek_bin", "greek", "iso-8859-7"),
    c(26, "cp1250_general_ci", "cp1250", "windows-1250"),
    c(34, "cp1250_czech_cs", "cp1250", "windows-1250"),
    c(44, "cp1250_croatian_ci", "cp1250", "windows-1250"),
    c(66, "cp1250_bin", "cp1250", "windows-1250"),
    c(99, "cp1250_polish_ci", "cp1250", "windows-1250"),
    c(28, "gbk_chinese_ci", "gbk", "gbk"),
    c(87, "gbk_bin", "gbk", "gbk"),
    c(30, "latin5_turkish_ci", "latin5", "iso-8859-9"),
    c(78, "latin5_bin", "latin5", "iso-8859-9"),
    c(32, "armscii8_general_ci", "armscii8", "armscii8"),
    c(64, "armscii8_bin", "armscii8", "armscii8"),
    c(33, "utf8mb3_general_ci", "utf8mb3", "utf8"),
    c(83, "utf8mb3_bin", "utf8mb3", "utf8"),
    c(192, "utf8mb3_unicode_ci", "utf8mb3", "utf8"),
    c(193, "utf8mb3_icelandic_ci", "utf8mb3", "utf8"),
    c(194, "utf8mb3_latvian_ci", "utf8mb3", "utf8"),
    c(195, "utf8mb3_romanian_ci", "utf8mb3", "utf8"),
    c(196, "utf8mb3_slovenian_ci", "utf8mb3", "utf8"),
    c(197, "utf8mb3_polish_ci", "utf8mb3", "utf8"),
    c(198, "utf8mb3_estonian_ci", "utf8mb3", "utf8"),
    c(199, "utf8mb3_spanish_ci", "utf8mb3", "utf8"),
    c(200, "utf8mb3_swedish_ci", "utf8mb3", "utf8"),
    c(201, "utf8mb3_turkish_ci", "utf8mb3", "utf8"),
    c(202, "utf8mb3_czech_ci", "utf8mb3", "utf8"),
    c(203, "utf8mb3_danish_ci", "utf8mb3", "utf8"),
    c(204, "utf8mb3_lithuanian_ci", "utf8mb3", "utf8"),
    c(205, "utf8mb3_slovak_ci", "utf8mb3", "utf8"),
    c(206, "utf8mb3_spanish2_ci", "utf8mb3", "utf8"),
    c(207, "utf8mb3_roman_ci", "utf8mb3", "utf8"),
    c(208, "utf8mb3_persian_ci", "utf8mb3", "utf8"),
    c(209, "utf8mb3_esperanto_ci", "utf8mb3", "utf8"),
    c(210, "utf8mb3_hungarian_ci", "utf8mb3", "utf8"),
    c(211, "utf8mb3_sinhala_ci", "utf8mb3", "utf8"),
    c(212, "utf8mb3_german2_ci", "utf8mb3", "utf8"),
    c(213, "utf8mb3_croatian_ci", "utf8mb3", "utf8"),
    c(214, "utf8mb3_unicode_520_ci", "utf8mb3", "utf8"),
    c(215, "utf8mb3_vietnamese_ci", "utf8mb3", "utf8"),
    c(223, "utf8mb3_general_mysql500_ci", "utf8mb3", "utf8"),
    c(35, "ucs2_general_ci", "ucs2", "ucs2"),
    c(90, "ucs2_bin", "ucs2", "ucs2"),
    c(128, "ucs2_unicode_ci", "ucs2", "ucs2"),
    c(129, "ucs2_icelandic_ci", "ucs2", "ucs2"),
    c(130, "ucs2_latvian_ci", "ucs2", "ucs2"),
    c(131, "ucs2_romanian_ci", "ucs2", "ucs2"),
    c(132, "ucs2_slovenian_ci", "ucs2", "ucs2"),
    c(133, "ucs2_polish_ci", "ucs2", "ucs2"),
    c(134, "ucs2_estonian_ci", "ucs2", "ucs2"),
    c(135, "ucs2_spanish_ci", "ucs2", "ucs2"),
    c(136, "ucs2_swedish_ci", "ucs2", "ucs2"),
    c(137, "ucs2_turkish_ci", "ucs2", "ucs2"),
    c(138, "ucs2_czech_ci", "ucs2", "ucs2"),
    c(139, "ucs2_danish_ci", "ucs2", "ucs2"),
    c(140, "ucs2_lithuanian_ci", "ucs2", "ucs2"),
    c(141, "ucs2_slovak_ci", "ucs2", "ucs2"),
    c(142, "ucs2_spanish2_ci", "ucs2", "ucs2"),
    c(143, "ucs2_roman_ci", "ucs2", "ucs2"),
    c(144, "ucs2_persian_ci", "ucs2", "ucs2"),
    c(145, "ucs2_esperanto_ci", "ucs2", "ucs2"),
    c(146, "ucs2_hungarian_ci", "ucs2", "ucs2"),
    c(147, "ucs2_sinhala_ci", "ucs2", "ucs2"),
    c(148, "ucs2_german2_ci", "ucs2", "ucs2"),
    c(149, "ucs2_croatian_ci", "ucs2", "ucs2"),
    c(150, "ucs2_unicode_520_ci", "ucs2", "ucs2"),
    c(151, "ucs2_vietnamese_ci", "ucs2", "ucs2"),
    c(159, "ucs2_general_mysql500_ci", "ucs2", "ucs2"),
    c(36, "cp866_general_ci", "cp866", "cp866"),
    c(68, "cp866_bin", "cp866", "cp866"),
    c(37, "keybcs2_general_ci", "keybcs2", "keybcs2"),
    c(73, "keybcs2_bin", "keybcs2", "keybcs2"),
    c(38, "macce_general_ci", "macce", "macce"),
    c(43, "macce_bin", "macce", "macce"),
    c(39, "macroman_general_ci", "macroman", "macintosh"),
    c(53, "macroman_bin", "macroman", "macintosh"),
    c(40, "cp852_general_ci", "cp852", "cp852"),
    c(81, "cp852_bin", "cp852", "cp852"),
    c(41, "latin7_general_ci", "latin7", "iso-8859-13"),
    c(20, "latin7_estonian_cs", "latin7", "iso-8859-13"),
    c(42, "latin7_general_cs", "latin7", "iso-8859-13"),
    c(79, "latin7_bin", "latin7", "iso-8859-13"),
    c(45, "utf8mb4_general_ci", "utf8mb4", "utf8"),
    c(46, "utf8mb4_bin", "utf8mb4", "utf8"),
    c(224, "utf8mb4_unicode_ci", "utf8mb4", "utf8"),
    c(225, "utf8mb4_icelandic_ci", "utf8mb4", "utf8"),
    c(226, "utf8mb4_latvian_ci", "utf8mb4", "utf8"),
    c(227, "utf8mb4_romanian_ci", "utf8mb4", "utf8"),
    c(228, "utf8mb4_slovenian_ci", "utf8mb4", "utf8"),
    c(229, "utf8mb4_polish_ci", "utf8mb4", "utf8"),
    c(230, "utf8mb4_estonian_ci", "utf8mb4", "utf8"),
    c(231, "utf8mb4_spanish_ci", "utf8mb4", "utf8"),
    c(232, "utf8mb4_swedish_ci", "utf8mb4", "utf8"),
    c(233, "utf8mb4_turkish_ci", "utf8mb4", "utf8"),
    c(234, "utf8mb4_czech_ci", "utf8mb4", "utf8"),
    c(235, "utf8mb4_danish_ci", "utf8mb4", "utf8"),
    c(236, "utf8mb4_lithuanian_ci", "utf8mb4", "utf8"),
    c(237, "utf8mb4_slovak_ci", "utf8mb4", "utf8"),
    c(238, "utf8mb4_spanish2_ci", "utf8mb4", "utf8"),
    c(239, "utf8mb4_roman_ci", "utf8mb4", "utf8"),
    c(240, "utf8mb4_persian_ci", "utf8mb4", "utf8"),
    c(241, "utf8mb4_esperanto_ci", "utf8mb4", "utf8"),
    c(242, "utf8mb4_hungarian_ci", "utf8mb4", "utf8"),
    c(243, "utf8mb4_sinhala_ci", "utf8mb4", "utf8"),
    c(244, "utf8mb4_german2_ci", "utf8mb4", "utf8"),
    c(245, "utf8mb4_croatian_ci", "utf8mb4", "utf8"),
    c(246, "utf8mb4_unicode_520_ci", "utf8mb4", "utf8"),
    c(247, "utf8mb4_vietnamese_ci", "utf8mb4", "utf8"),
    c(255, "utf8mb4_0900_ai_ci", "utf8mb4", "utf8"),
    c(305, "utf8mb4_0900_as_cs", "utf8mb4", "utf8"),
    c(309, "utf8mb4_0900_bin", "utf8mb4", "utf8"),
    c(2304, "utf8mb4_uca1400_ai_ci", "utf8mb4", "utf8"),
    c(51, "cp1251_general_ci", "cp1251", "windows-1251"),
    c(14, "cp1251_bulgarian_ci", "cp1251", "windows-1251"),
    c(23, "cp1251_ukrainian_ci", "cp1251", "windows-1251"),
    c(50, "cp1251_bin", "cp1251", "windows-1251"),
    c(52, "cp1251_general_cs", "cp1251", "windows-1251"),
    c(54, "utf16_general_ci", "utf16", "utf16"),
    c(55, "utf16_bin", "utf16", "utf16"),
    c(101, "utf16_unicode_ci", "utf16", "utf16"),
    c(102, "utf16_icelandic_ci", "utf16", "utf16"),
    c(103, "utf16_latvian_ci", "utf16", "utf16"),
    c(104, "utf16_romanian_ci", "utf16", "utf16"),
    c(105, "utf16_slovenian_ci", "utf16", "utf16"),
    c(106, "utf16_polish_ci", "utf16", "utf16"),
    c(107, "utf16_estonian_ci", "utf16", "utf16"),
    c(108, "utf16_spanish_ci", "utf16", "utf16"),
    c(109, "utf16_swedish_ci", "utf16", "utf16"),
    c(110, "utf16_turkish_ci", "utf16", "utf16"),
    c(111, "utf16_czech_ci", "utf16", "utf16"),
    c(112, "utf16_danish_ci", "utf16", "utf16"),
    c(113, "utf16_lithuanian_ci", "utf16", "utf16"),
    c(114, "utf16_slovak_ci", "utf16", "utf16"),
    c(115, "utf16_spanish2_ci", "utf16", "utf16"),
    c(116, "utf16_roman_ci", "utf16", "utf16"),
    c(117, "utf16_persian_ci", "utf16", "utf16"),
    c(118, "utf16_esperanto_ci", "utf16", "utf16"),
    c(119, "utf16_hungarian_ci", "utf16", "utf16"),
    c(120, "utf16_sinhala_ci", "utf16", "utf16"),
    c(121, "utf16_german2_ci", "utf16", "utf16"),
    c(122, "utf16_croatian_ci", "utf16", "utf16"),
    c(123, "utf16_unicode_520_ci", "utf16", "utf16"),
    c(124, "utf16_vietnamese_ci", "utf16", "utf16"),
    c(56, "utf16le_general_ci", "utf16le", "utf16le"),
    c(62, "utf16le_bin", "utf16le", "utf16le"),
    c(57, "cp1256_general_ci", "cp1256", "windows-1256"),
    c(67, "cp1256_bin", "cp1256", "windows-1256"),
    c(59, "cp1257_general_ci", "cp1257", "windows-1257"),
    c(29, "cp1257_lithuanian_ci", "cp1257", "windows-1257"),
    c(58, "cp1257_bin", "cp1257", "windows-1257"),
    c(60, "utf32_general_ci", "utf32", "utf32"),
    c(61, "utf32_bin", "utf32", "utf32"),
    c(160, "utf32_unicode_ci", "utf32", "utf32"),
    c(161, "utf32_icelandic_ci", "utf32", "utf32"),
    c(162, "utf32_latvian_ci", "utf32", "utf32"),
    c(163, "utf32_romanian_ci", "utf32", "utf32"),
    c(164, "utf32_slovenian_ci", "utf32", "utf32"),
    c(165, "utf32_polish_ci", "utf32", "utf32"),
    c(166, "utf32_estonian_ci", "utf32", "utf32"),
    c(167, "utf32_spanish_ci", "utf32", "utf32"),
    c(168, "utf32_swedish_ci", "utf32", "utf32"),
    c(169, "utf32_turkish_ci", "utf32", "utf32"),
    c(170, "utf32_czech_ci", "utf32", "utf32"),
    c(171, "utf32_danish_ci", "utf32", "utf32"),
    c(172, "utf32_lithuanian_ci", "utf32", "utf32"),
    c(173, "utf32_slovak_ci", "utf32", "utf32"),
    c(174, "utf32_spanish2_ci", "utf32", "utf32"),
    c(175, "utf32_roman_ci", "utf32", "utf32"),
    c(176, "utf32_persian_ci", "utf32", "utf32"),
    c(177, "utf32_esperanto_ci", "utf32", "utf32"),
    c(178, "utf32_hungarian_ci", "utf32", "utf32"),
    c(179, "utf32_sinhala_ci", "utf32", "utf32"),
    c(180, "utf32_german2_ci", "utf32", "utf32"),
    c(181, "utf32_croatian_ci", "utf32", "utf32"),
    c(182, "utf32_unicode_520_ci", "utf32", "utf32"),
    c(183, "utf32_vietnamese_ci", "utf32", "utf32"),
    c(63, "binary", "binary", "binary"),
    c(92, "geostd8_general_ci", "geostd8", "geostd8"),
    c(93, "geostd8_bin", "geostd8", "geostd8"),
    c(95, "cp932_japanese_ci", "cp932", "shift_jis"),
    c(96, "cp932_bin", "cp932", "shift_jis"),
    c(97, "eucjpms_japanese_ci", "eucjpms", "euc-jp"),
    c(98, "eucjpms_bin", "eucjpms", "euc-jp"),
    c(248, "gb18030_chinese_ci", "gb18030", "gb18030"),
    c(249, "gb18030_bin", "gb18030", "gb18030"),
    c(250, "gb18030_unicode_520_ci", "gb18030", "gb18030"),
];

static BY_ID: LazyLock<HashMap<u16, &'static Collation>> =
    LazyLock::new(|| COLLATIONS.iter().map(|c| (c.id, c)).collect());

static BY_NAME: LazyLock<HashMap<&'static str, &'static Collation>> = LazyLock::new(|| {
    let mut map = HashMap::with_capacity(COLLATIONS.len() * 2);
    for collation in COLLATIONS.iter() {
        map.insert(collation.name, collation);
    }
    // charset name -> default collation; "utf8" is the legacy alias of utf8mb3
    for collation in COLLATIONS.iter() {
        map.entry(collation.charset).or_insert(collation);
    }
    if let Some(utf8) = map.get("utf8mb3_general_ci").copied() {
        map.entry("utf8").or_insert(utf8);
    }
    map
});

pub fn from_id(id: u16) -> Option<&'static Collation> {
    BY_ID.get(&id).copied()
}

/// Look up a collation or character-set name, ignoring case.
///
/// `utf8_*` collation names are accepted as aliases of `utf8mb3_*`.
pub fn from_name(name: &str) -> Option<&'static Collation> {
    let name = name.to_ascii_lowercase();
    if let Some(found) = BY_NAME.get(name.as_str()) {
        return Some(*found);
    }
    let rest = name.strip_prefix("utf8_")?;
    BY_NAME.get(format!("utf8mb3_{rest}").as_str()).copied()
}

/// Resolve the configured charset: a name takes precedence over a number.
pub fn resolve(name: Option<&str>, number: Option<u16>) -> Result<&'static Collation> {
    if let Some(name) = name {
        return from_name(name)
            .ok_or_else(|| Error::BadConfigError(format!("Unknown charset '{name}'")));
    }
    match number {
        Some(id) => {
            from_id(id).ok_or_else(|| Error::BadConfigError(format!("Unknown charset number {id}")))
        }
        None => default(),
    }
}

pub fn default() -> Result<&'static Collation> {
    from_id(DEFAULT_COLLATION_ID)
        .ok_or_else(|| Error::BadConfigError("default collation missing".to_string()))
}
