use sha2::{Digest, Sha256};

const NO_NAME: &str = "NO_NAME";
const NO_MODEL: &str = "NO_MODEL";
const NO_CODE: &str = "NO_CODE";

/// Кодовое пространство артикула: 10 десятичных цифр
const ARTICLE_SPACE: u64 = 10_000_000_000;

/// Сгенерировать артикул по наименованию, модели и коду ТН ВЭД
///
/// Детерминированно: одинаковые входы всегда дают одинаковый код, поэтому
/// артикул служит ключом дедупликации. Коллизии в пространстве 10^10
/// считаются приемлемыми для каталогов реального размера.
pub fn generate_article(name: &str, model: &str, tariff_code: &str) -> String {
    let name = normalize(name, NO_NAME);
    let model = normalize(model, NO_MODEL);
    let tariff_code = normalize(tariff_code, NO_CODE);

    let input = format!("{}|{}|{}", name, model, tariff_code);

    let digest = Sha256::digest(input.as_bytes());

    // Первые 8 байт дайджеста как big-endian u64
    let mut hash_as_number: u64 = 0;
    for byte in &digest[..8] {
        hash_as_number = (hash_as_number << 8) | *byte as u64;
    }

    format!("{:010}", hash_as_number % ARTICLE_SPACE)
}

fn normalize<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_is_ten_digits() {
        let article = generate_article("Болт М6", "Сталь", "7318159000");
        assert_eq!(article.len(), 10);
        assert!(article.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_article_is_deterministic() {
        let a = generate_article("Болт М6", "Сталь", "7318159000");
        let b = generate_article("Болт М6", "Сталь", "7318159000");
        assert_eq!(a, b);
    }

    #[test]
    fn test_known_vector() {
        // Фиксирует алгоритм: SHA-256, первые 8 байт, mod 10^10
        assert_eq!(generate_article("Bolt M6", "Steel", "7318159000"), "5690073128");
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        assert_eq!(
            generate_article("  Bolt M6  ", "Steel", "7318159000"),
            generate_article("Bolt M6", "Steel", "7318159000")
        );
    }

    #[test]
    fn test_blank_inputs_use_sentinels() {
        assert_eq!(
            generate_article("", "  ", ""),
            generate_article("NO_NAME", "NO_MODEL", "NO_CODE")
        );
    }

    #[test]
    fn test_different_inputs_differ() {
        assert_ne!(
            generate_article("Bolt M6", "Steel", "7318159000"),
            generate_article("bolt m6", "Steel", "7318159000")
        );
    }
}
