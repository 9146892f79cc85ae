use std::collections::HashMap;
use std::str::FromStr;

/// 渲染器参数，key-value 形式
///
/// 可识别的 key 由各个渲染器自己决定，例如 `ui_context`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderParams {
    values: HashMap<String, String>,
}
impl RenderParams {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.values.insert(key.into(), value.to_string());
        self
    }

    #[inline]
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), value.to_string());
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// 无法解析时返回 None 并给出警告
    pub fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match value.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                log::warn!("render param `{}` = `{}` cannot be parsed", key, value);
                None
            }
        }
    }

    #[inline]
    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.parse(key).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let params = RenderParams::new().with("ui_context", "main").with("exposure", 1.5).with("msaa", "yes");
        assert_eq!(params.get("ui_context"), Some("main"));
        assert_eq!(params.parse::<f32>("exposure"), Some(1.5));
        assert_eq!(params.parse::<u32>("msaa"), None);
        assert_eq!(params.parse_or("missing", 4u32), 4);
    }
}
