use std::collections::HashMap;

use super::TokenNormalizer;

/// Thai consonants in alphabet order. Class label `A01` is the first entry.
pub const THAI_CONSONANTS: [&str; 44] = [
    "ก", "ข", "ฃ", "ค", "ฅ", "ฆ", "ง", "จ", "ฉ", "ช", "ซ", "ฌ", "ญ", "ฎ", "ฏ", "ฐ", "ฑ", "ฒ",
    "ณ", "ด", "ต", "ถ", "ท", "ธ", "น", "บ", "ป", "ผ", "ฝ", "พ", "ฟ", "ภ", "ม", "ย", "ร", "ล",
    "ว", "ศ", "ษ", "ส", "ห", "ฬ", "อ", "ฮ",
];

/// Province class labels (romanised) and their Thai names.
pub const PROVINCES: [(&str, &str); 77] = [
    ("Bangkok", "กรุงเทพมหานคร"),
    ("Amnat Charoen", "อำนาจเจริญ"),
    ("Ang Thong", "อ่างทอง"),
    ("Bueng Kan", "บึงกาฬ"),
    ("Buriram", "บุรีรัมย์"),
    ("Chachoengsao", "ฉะเชิงเทรา"),
    ("Chai Nat", "ชัยนาท"),
    ("Chaiyaphum", "ชัยภูมิ"),
    ("Chanthaburi", "จันทบุรี"),
    ("Chiang Mai", "เชียงใหม่"),
    ("Chiang Rai", "เชียงราย"),
    ("Chonburi", "ชลบุรี"),
    ("Chumphon", "ชุมพร"),
    ("Kalasin", "กาฬสินธุ์"),
    ("Kamphaeng Phet", "กำแพงเพชร"),
    ("Kanchanaburi", "กาญจนบุรี"),
    ("Khon Kaen", "ขอนแก่น"),
    ("Krabi", "กระบี่"),
    ("Lampang", "ลำปาง"),
    ("Lamphun", "ลำพูน"),
    ("Loei", "เลย"),
    ("Lopburi", "ลพบุรี"),
    ("Mae Hong Son", "แม่ฮ่องสอน"),
    ("Maha Sarakham", "มหาสารคาม"),
    ("Mukdahan", "มุกดาหาร"),
    ("Nakhon Nayok", "นครนายก"),
    ("Nakhon Pathom", "นครปฐม"),
    ("Nakhon Phanom", "นครพนม"),
    ("Nakhon Ratchasima", "นครราชสีมา"),
    ("Nakhon Sawan", "นครสวรรค์"),
    ("Nakhon Si Thammarat", "นครศรีธรรมราช"),
    ("Nan", "น่าน"),
    ("Narathiwat", "นราธิวาส"),
    ("Nong Bua Lamphu", "หนองบัวลำภู"),
    ("Nong Khai", "หนองคาย"),
    ("Nonthaburi", "นนทบุรี"),
    ("Pathum Thani", "ปทุมธานี"),
    ("Pattani", "ปัตตานี"),
    ("Phang Nga", "พังงา"),
    ("Phatthalung", "พัทลุง"),
    ("Phayao", "พะเยา"),
    ("Phetchabun", "เพชรบูรณ์"),
    ("Phetchaburi", "เพชรบุรี"),
    ("Phichit", "พิจิตร"),
    ("Phitsanulok", "พิษณุโลก"),
    ("Phra Nakhon Si Ayutthaya", "พระนครศรีอยุธยา"),
    ("Phrae", "แพร่"),
    ("Phuket", "ภูเก็ต"),
    ("Prachinburi", "ปราจีนบุรี"),
    ("Prachuap Khiri Khan", "ประจวบคีรีขันธ์"),
    ("Ranong", "ระนอง"),
    ("Ratchaburi", "ราชบุรี"),
    ("Rayong", "ระยอง"),
    ("Roi Et", "ร้อยเอ็ด"),
    ("Sa Kaeo", "สระแก้ว"),
    ("Sakon Nakhon", "สกลนคร"),
    ("Samut Prakan", "สมุทรปราการ"),
    ("Samut Sakhon", "สมุทรสาคร"),
    ("Samut Songkhram", "สมุทรสงคราม"),
    ("Saraburi", "สระบุรี"),
    ("Satun", "สตูล"),
    ("Sing Buri", "สิงห์บุรี"),
    ("Sisaket", "ศรีสะเกษ"),
    ("Songkhla", "สงขลา"),
    ("Sukhothai", "สุโขทัย"),
    ("Suphan Buri", "สุพรรณบุรี"),
    ("Surat Thani", "สุราษฎร์ธานี"),
    ("Surin", "สุรินทร์"),
    ("Tak", "ตาก"),
    ("Trang", "ตรัง"),
    ("Trat", "ตราด"),
    ("Ubon Ratchathani", "อุบลราชธานี"),
    ("Udon Thani", "อุดรธานี"),
    ("Uthai Thani", "อุทัยธานี"),
    ("Uttaradit", "อุตรดิตถ์"),
    ("Yala", "ยะลา"),
    ("Yasothon", "ยโสธร"),
];

/// Normalizer for Thai plates.
///
/// Label scheme: `A01`..`A44` are consonants, `0`..`9` are digits, and
/// province labels are romanised names (case, spaces, `_` and `-` are
/// ignored) or the Thai name itself. Unknown labels pass through unchanged.
#[derive(Clone, Debug)]
pub struct ThaiPlateNormalizer {
    provinces: HashMap<String, &'static str>,
}

impl ThaiPlateNormalizer {
    pub fn new() -> Self {
        let mut provinces = HashMap::with_capacity(PROVINCES.len() * 2);
        for (romanised, thai) in PROVINCES {
            provinces.insert(province_key(romanised), thai);
            provinces.insert(thai.to_string(), thai);
        }
        Self { provinces }
    }

    fn province_name(&self, label: &str) -> Option<&'static str> {
        self.provinces
            .get(label)
            .or_else(|| self.provinces.get(&province_key(label)))
            .copied()
    }

    /// Glyph text for a single class label.
    pub fn glyph_for(&self, label: &str) -> String {
        if let Some(consonant) = consonant_for(label) {
            return consonant.to_string();
        }
        if let Some(province) = self.province_name(label) {
            return province.to_string();
        }
        label.to_string()
    }
}

impl Default for ThaiPlateNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenNormalizer for ThaiPlateNormalizer {
    fn is_province(&self, label: &str) -> bool {
        self.province_name(label).is_some()
    }

    fn normalize(&self, labels: &[String]) -> (String, String) {
        let combined: String = labels.iter().map(|label| self.glyph_for(label)).collect();
        split_plate_and_province(&combined)
    }
}

fn consonant_for(label: &str) -> Option<&'static str> {
    let digits = label.strip_prefix('A')?;
    if digits.len() != 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let index: usize = digits.parse().ok()?;
    index.checked_sub(1).and_then(|i| THAI_CONSONANTS.get(i).copied())
}

fn province_key(label: &str) -> String {
    label
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split combined plate text after its last digit.
///
/// Text without any digit is not a plate and yields two empty strings.
pub fn split_plate_and_province(text: &str) -> (String, String) {
    let Some((index, digit)) = text.char_indices().rev().find(|(_, c)| c.is_numeric()) else {
        return (String::new(), String::new());
    };
    let end = index + digit.len_utf8();
    (
        text[..end].trim().to_string(),
        text[end..].trim().to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn consonant_labels_map_in_alphabet_order() {
        let normalizer = ThaiPlateNormalizer::new();
        assert_eq!(normalizer.glyph_for("A01"), "ก");
        assert_eq!(normalizer.glyph_for("A02"), "ข");
        assert_eq!(normalizer.glyph_for("A44"), "ฮ");
        assert_eq!(normalizer.glyph_for("A45"), "A45");
        assert_eq!(normalizer.glyph_for("A00"), "A00");
        assert_eq!(normalizer.glyph_for("7"), "7");
    }

    #[test]
    fn province_labels_are_recognised_loosely() {
        let normalizer = ThaiPlateNormalizer::new();
        assert!(normalizer.is_province("Bangkok"));
        assert!(normalizer.is_province("nakhon_ratchasima"));
        assert!(normalizer.is_province("Chiang-Mai"));
        assert!(normalizer.is_province("ภูเก็ต"));
        assert!(!normalizer.is_province("A01"));
        assert!(!normalizer.is_province("1"));
        assert_eq!(normalizer.glyph_for("PHUKET"), "ภูเก็ต");
    }

    #[test]
    fn province_table_has_no_duplicates() {
        let normalizer = ThaiPlateNormalizer::new();
        assert_eq!(normalizer.provinces.len(), PROVINCES.len() * 2);
    }

    #[test]
    fn split_basic() {
        let (plate, province) = split_plate_and_province("กข1234กรุงเทพมหานคร");
        assert_eq!(plate, "กข1234");
        assert_eq!(province, "กรุงเทพมหานคร");
    }

    #[test]
    fn split_without_digits_is_empty() {
        let (plate, province) = split_plate_and_province("ไม่มีตัวเลขที่นี่");
        assert!(plate.is_empty());
        assert!(province.is_empty());
    }

    #[test]
    fn split_without_province() {
        assert_eq!(
            split_plate_and_province("1กข234"),
            ("1กข234".to_string(), String::new())
        );
    }

    #[test]
    fn normalize_full_plate() {
        let normalizer = ThaiPlateNormalizer::new();
        let (plate, province) =
            normalizer.normalize(&labels(&["A01", "A02", "1", "2", "3", "4", "Bangkok"]));
        assert_eq!(plate, "กข1234");
        assert_eq!(province, "กรุงเทพมหานคร");
    }

    #[test]
    fn normalize_digits_only() {
        let normalizer = ThaiPlateNormalizer::new();
        let (plate, province) = normalizer.normalize(&labels(&["1", "2", "3", "4"]));
        assert_eq!(plate, "1234");
        assert_eq!(province, "");
    }

    #[test]
    fn normalize_letters_only_reads_nothing() {
        let normalizer = ThaiPlateNormalizer::new();
        let (plate, province) = normalizer.normalize(&labels(&["A01", "Chonburi"]));
        assert_eq!((plate.as_str(), province.as_str()), ("", ""));
    }
}
