//! Record - 쿼리 결과 레코드

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::error::{DriverError, DriverResult};
use super::value::Value;

/// 쿼리 결과 레코드. 같은 결과의 레코드들은 키 목록을 공유한다.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    keys: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    /// 새 레코드 생성. 값 개수가 키 개수와 다르면 에러.
    pub fn new(keys: Arc<[String]>, values: Vec<Value>) -> DriverResult<Self> {
        if keys.len() != values.len() {
            return Err(DriverError::type_conversion(format!(
                "record has {} values for {} fields",
                values.len(),
                keys.len()
            )));
        }
        Ok(Self { keys, values })
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index_of(key).is_some()
    }

    fn index_of(&self, key: &str) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    /// 키로 값 가져오기
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index_of(key).map(|i| &self.values[i])
    }

    /// 인덱스로 값 가져오기
    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// 타입 변환해서 가져오기
    pub fn get_as<T>(&self, key: &str) -> DriverResult<T>
    where
        T: TryFrom<Value, Error = DriverError>,
    {
        let value = self
            .get(key)
            .ok_or_else(|| DriverError::type_conversion(format!("no field named '{}'", key)))?;
        T::try_from(value.clone())
    }

    /// Null이나 없는 키는 None
    pub fn get_optional<T>(&self, key: &str) -> DriverResult<Option<T>>
    where
        T: TryFrom<Value, Error = DriverError>,
    {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => T::try_from(v.clone()).map(Some),
        }
    }

    /// 값 목록으로 분해
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// 키-값 맵으로 변환
    pub fn to_map(&self) -> HashMap<String, Value> {
        self.keys.iter().cloned().zip(self.values.iter().cloned()).collect()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.keys.iter().zip(&self.values).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        f.write_str("}")
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::iter::Zip<std::slice::Iter<'a, String>, std::slice::Iter<'a, Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter().zip(self.values.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        let keys: Arc<[String]> = vec!["name".to_string(), "age".to_string(), "nick".to_string()].into();
        Record::new(keys, vec!["Alice".into(), Value::Integer(30), Value::Null]).unwrap()
    }

    #[test]
    fn test_lookup() {
        let r = record();
        assert_eq!(r.get("age"), Some(&Value::Integer(30)));
        assert_eq!(r.get_by_index(0), Some(&Value::from("Alice")));
        assert_eq!(r.get("missing"), None);
        assert!(r.contains_key("nick"));
        assert_eq!(r.to_string(), "{name: \"Alice\", age: 30, nick: null}");
    }

    #[test]
    fn test_typed_access() {
        let r = record();
        assert_eq!(r.get_as::<String>("name").unwrap(), "Alice");
        assert!(r.get_as::<i64>("name").is_err());
        assert!(r.get_as::<i64>("missing").is_err());
        assert_eq!(r.get_optional::<i64>("nick").unwrap(), None);
        assert_eq!(r.get_optional::<i64>("age").unwrap(), Some(30));
    }

    #[test]
    fn test_arity_mismatch() {
        let keys: Arc<[String]> = vec!["a".to_string()].into();
        assert!(Record::new(keys, vec![]).is_err());
    }
}
