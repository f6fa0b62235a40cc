//! Device error payloads.
//!
//! When a command fails the register answers with an element such as
//! `<ERROR No='2' FSE='3' TAG='1008' PAR='INN'/>` instead of the regular
//! result. The marker is ASCII, so it is looked for in the raw Windows-1251
//! bytes before anything is decoded.

use crate::kkt::encoding;
use crate::kkt::error::{KktError, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::Serialize;
use std::fmt;

/// Marker token present in every error response.
pub const ERROR_MARKER: &[u8] = b"ERROR";

/// Description used for codes missing from [`ERROR_DESCRIPTIONS`].
pub const UNKNOWN_ERROR: &str = "неизвестная ошибка";

/// Code to description table shared by the register (`No`) and its fiscal
/// storage (`FSE`). The wording is the vendor's and is quoted verbatim in
/// messages because support requests reference it.
pub static ERROR_DESCRIPTIONS: &[(&str, &str)] = &[
    ("1", "Неизвестная команда, неверный формат посылки или неизвестные параметры"),
    ("2", "Неверное состояние ФН"),
    ("3", "Отказ ФН"),
    ("4", "Отказ КС"),
    ("5", "Параметры команды не соответствуют сроку жизни ФН"),
    ("7", "Некорректная дата и/или время"),
    ("8", "Нет запрошенных данных"),
    ("9", "Некорректное значение параметров команды"),
    ("10", "Некорректная команда"),
    ("11", "Неразрешенные реквизиты"),
    ("12", "Дублирование данных"),
    ("13", "Отсутствуют данные, необходимые для корректного учета в ФН"),
    ("14", "Количество позиций в документе превысило допустимый предел"),
    ("16", "Превышение размеров TLV данных"),
    ("17", "Нет транспортного соединения"),
    ("18", "Исчерпан ресурс ФН"),
    ("20", "Ограничение ресурса ФН"),
    ("21", "Исчерпан ресурс ожидания передачи сообщения"),
    ("22", "Продолжительность смены более 24 часов"),
    ("23", "Неверная разница во времени между двумя операциями"),
    ("24", "Некорректный реквизит, переданный ККТ в ФН"),
    ("25", "Некорректный реквизит с признаком продажи подакцизного товара"),
    ("32", "Сообщение от ОФД не может быть принято"),
    ("35", "Ошибка сервиса обновления ключей проверки КМ"),
    ("48", "ФН не отвечает"),
    ("50", "Команда не выполнена: смена не открыта"),
    ("51", "Команда не выполнена: смена открыта"),
    ("52", "Команда не выполнена: открыт документ"),
    ("53", "Команда не выполнена: документ не открыт"),
    ("60", "Нет бумаги"),
    ("61", "Открыта крышка принтера"),
    ("62", "Ошибка отрезчика"),
    ("63", "Перегрев печатающей головки"),
];

/// Look up the registered description for a code.
pub fn describe(code: &str) -> Option<&'static str> {
    ERROR_DESCRIPTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, d)| *d)
}

// ---------------------------------------------------------------------------
// Structured error
// ---------------------------------------------------------------------------

/// Decoded `<ERROR .../>` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceError {
    /// Register error code (`No`).
    pub code: String,
    /// Fiscal storage error code (`FSE`).
    pub fse: Option<String>,
    /// Fiscal tag the error refers to (`TAG`).
    pub tag: Option<String>,
    /// Offending command parameter (`PAR`).
    pub par: Option<String>,
}

impl DeviceError {
    pub fn description(&self) -> &'static str {
        describe(&self.code).unwrap_or(UNKNOWN_ERROR)
    }

    pub fn message(&self) -> String {
        let mut msg = format!("KKT error #{}: {}", self.code, self.description());
        if let Some(ref par) = self.par {
            msg.push_str(&format!(" (parameter: {par})"));
        }
        if let Some(ref fse) = self.fse {
            match describe(fse) {
                Some(desc) => msg.push_str(&format!(", FN error #{fse}: {desc}")),
                None => msg.push_str(&format!(", FN error: {fse}")),
            }
        }
        if let Some(ref tag) = self.tag {
            msg.push_str(&format!(" [TAG: {tag}]"));
        }
        msg
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for DeviceError {}

// ---------------------------------------------------------------------------
// Detection and decoding
// ---------------------------------------------------------------------------

/// Whether a raw response carries the error marker.
pub fn detect(raw: &[u8]) -> bool {
    raw.windows(ERROR_MARKER.len()).any(|w| w == ERROR_MARKER)
}

/// Turn an error response into a [`KktError`].
///
/// Always returns an error: [`KktError::Device`] when the element parses, or
/// [`KktError::UnrecognizedDeviceError`] quoting the raw bytes otherwise.
pub fn decode(raw: &[u8]) -> KktError {
    match parse(raw) {
        Ok(e) => KktError::Device(e),
        Err(_) => KktError::UnrecognizedDeviceError {
            raw: encoding::decode_lossy(raw),
        },
    }
}

/// Strictly decode the bytes and extract the first `ERROR` element.
pub fn parse(raw: &[u8]) -> Result<DeviceError> {
    let text = encoding::decode(raw)?;
    let mut reader = Reader::from_str(&text);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == ERROR_MARKER => {
                let mut code = None;
                let mut fse = None;
                let mut tag = None;
                let mut par = None;
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| xml_error(e.to_string()))?;
                    let value = attr
                        .unescape_value()
                        .map_err(|e| xml_error(e.to_string()))?
                        .trim()
                        .to_string();
                    if value.is_empty() {
                        continue;
                    }
                    match attr.key.as_ref() {
                        b"No" => code = Some(value),
                        b"FSE" => fse = Some(value),
                        b"TAG" => tag = Some(value),
                        b"PAR" => par = Some(value),
                        _ => {}
                    }
                }
                let code = code.ok_or_else(|| xml_error("ERROR element has no code".into()))?;
                return Ok(DeviceError {
                    code,
                    fse,
                    tag,
                    par,
                });
            }
            Ok(Event::Eof) => return Err(xml_error("no ERROR element in response".into())),
            Err(e) => return Err(xml_error(e.to_string())),
            _ => {}
        }
    }
}

fn xml_error(msg: String) -> KktError {
    KktError::Encoding(format!("malformed error payload: {msg}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_marker() {
        assert!(detect(b"<ERROR No='2'/>"));
        assert!(detect(b"<ANS><ERROR No='2'/></ANS>"));
        assert!(!detect(b"<DEV NAME='X1'/>"));
        assert!(!detect(b""));
    }

    #[test]
    fn test_detect_on_cyrillic_payload() {
        let raw = encoding::encode("<OK NAME='Ошибок нет'/>").unwrap();
        assert!(!detect(&raw));
        let raw = encoding::encode("<ERROR No='9' PAR='Кассир'/>").unwrap();
        assert!(detect(&raw));
    }

    #[test]
    fn test_known_code_message() {
        let err = parse(b"<ERROR No='2'/>").unwrap();
        assert_eq!(err.code, "2");
        let msg = err.to_string();
        assert!(msg.contains("#2"));
        assert!(msg.contains("Неверное состояние ФН"));
    }

    #[test]
    fn test_unknown_code_message() {
        let err = parse(b"<ERROR No='999'/>").unwrap();
        let msg = err.to_string();
        assert!(msg.contains("999"));
        assert!(msg.contains(UNKNOWN_ERROR));
    }

    #[test]
    fn test_full_message_composition() {
        let raw = encoding::encode("<ERROR No='9' FSE='3' TAG='1008' PAR='Кассир'/>").unwrap();
        let err = parse(&raw).unwrap();
        assert_eq!(err.fse.as_deref(), Some("3"));
        assert_eq!(err.tag.as_deref(), Some("1008"));
        assert_eq!(err.par.as_deref(), Some("Кассир"));
        assert_eq!(
            err.message(),
            "KKT error #9: Некорректное значение параметров команды (parameter: Кассир), \
             FN error #3: Отказ ФН [TAG: 1008]"
        );
    }

    #[test]
    fn test_unknown_fse_falls_back_to_bare_code() {
        let err = parse(b"<ERROR No='2' FSE='777'/>").unwrap();
        assert!(err.message().ends_with(", FN error: 777"));
    }

    #[test]
    fn test_empty_attributes_are_absent() {
        let err = parse(b"<ERROR No='2' FSE='' TAG='' PAR=''/>").unwrap();
        assert_eq!(err.fse, None);
        assert_eq!(err.tag, None);
        assert_eq!(err.par, None);
    }

    #[test]
    fn test_nested_error_element() {
        let err = parse(b"<ANS><ERROR No=\"17\"></ERROR></ANS>").unwrap();
        assert_eq!(err.code, "17");
    }

    #[test]
    fn test_decode_unparseable_quotes_raw() {
        match decode(b"ERROR: printer jam") {
            KktError::UnrecognizedDeviceError { raw } => assert_eq!(raw, "ERROR: printer jam"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_missing_code_is_unrecognized() {
        assert!(matches!(
            decode(b"<ERROR PAR='x'/>"),
            KktError::UnrecognizedDeviceError { .. }
        ));
    }

    #[test]
    fn test_decode_undecodable_bytes_are_unrecognized() {
        let mut raw = b"<ERROR No='2'/>".to_vec();
        raw.push(0x98);
        match decode(&raw) {
            KktError::UnrecognizedDeviceError { raw } => {
                assert!(raw.starts_with("<ERROR No='2'/>"));
                assert!(raw.ends_with('\u{FFFD}'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_returns_device_error() {
        let err = decode(b"<ERROR No='60'/>");
        let dev = err.device_error().unwrap();
        assert_eq!(dev.description(), "Нет бумаги");
    }

    #[test]
    fn test_table_codes_are_unique() {
        let mut codes: Vec<&str> = ERROR_DESCRIPTIONS.iter().map(|(c, _)| *c).collect();
        let total = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), total);
    }
}
