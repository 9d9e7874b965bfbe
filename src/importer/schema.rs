// ==========================================
// 批量导入作业引擎 - 导入 Schema
// ==========================================
// 职责: 字段注册（key / 标签 / 类型 / 校验器）+ 单行校验
// 约束: 标签 ↔ key 双向映射在构建时一次性生成
// ==========================================

use crate::domain::record::{FieldErrors, NormalizedRecord};
use crate::importer::error::{ImportError, ImportResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

pub const MSG_REQUIRED: &str = "This field is required.";
pub const MSG_NOT_A_NUMBER: &str = "not a number";
pub const MSG_NOT_A_BOOLEAN: &str = "not a valid boolean";
pub const MSG_NOT_A_DATE: &str = "not a valid date";
pub const MSG_INVALID_CHOICE: &str = "not a valid choice";

/// 日期兼容格式（按顺序尝试）
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d"];

/// 自定义字段校验器（作用于类型转换后的值）
pub type FieldValidatorFn = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

// ==========================================
// FieldKind - 字段类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
}

impl FieldKind {
    /// 将非空原始文本转换为类型化值
    fn coerce(&self, raw: &str) -> Result<Value, String> {
        match self {
            FieldKind::Text => Ok(Value::String(raw.to_string())),
            FieldKind::Integer => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| MSG_NOT_A_NUMBER.to_string()),
            FieldKind::Decimal => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| MSG_NOT_A_NUMBER.to_string()),
            FieldKind::Boolean => match raw.to_lowercase().as_str() {
                "true" | "1" | "yes" | "y" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "n" => Ok(Value::Bool(false)),
                _ => Err(MSG_NOT_A_BOOLEAN.to_string()),
            },
            FieldKind::Date => DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .ok_or_else(|| MSG_NOT_A_DATE.to_string()),
        }
    }
}

impl std::str::FromStr for FieldKind {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "string" => Ok(FieldKind::Text),
            "integer" | "int" => Ok(FieldKind::Integer),
            "decimal" | "float" | "number" => Ok(FieldKind::Decimal),
            "boolean" | "bool" => Ok(FieldKind::Boolean),
            "date" => Ok(FieldKind::Date),
            other => Err(ImportError::UnknownFieldKind(other.to_string())),
        }
    }
}

// ==========================================
// FieldSpec - 字段定义
// ==========================================
#[derive(Clone)]
pub struct FieldSpec {
    pub key: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    validators: Vec<FieldValidatorFn>,
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("key", &self.key)
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("validators", &self.validators.len())
            .finish()
    }
}

impl FieldSpec {
    /// 校验单个字段；返回类型化值或有序错误列表
    fn clean(&self, raw: Option<&str>) -> Result<Value, Vec<String>> {
        let raw = raw.map(str::trim).filter(|v| !v.is_empty());

        let value = match raw {
            None if self.required => return Err(vec![MSG_REQUIRED.to_string()]),
            None => return Ok(Value::Null),
            Some(raw) => self.kind.coerce(raw).map_err(|e| vec![e])?,
        };

        let errors: Vec<String> = self
            .validators
            .iter()
            .filter_map(|validate| validate(&value).err())
            .collect();

        if errors.is_empty() {
            Ok(value)
        } else {
            Err(errors)
        }
    }
}

// ==========================================
// SchemaDefinition - 可序列化的 Schema 描述
// ==========================================
// 用途: 从配置（config_kv）加载 Schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub key: String,
    pub label: String,
    pub kind: FieldKind,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub choices: Option<Vec<String>>,
}

fn default_required() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub natural_key: Vec<String>,
}

// ==========================================
// Schema
// ==========================================
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    label_to_key: HashMap<String, String>,
    key_to_label: HashMap<String, String>,
    natural_key: Vec<String>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// 从可序列化描述构建 Schema
    pub fn from_definition(definition: &SchemaDefinition) -> ImportResult<Self> {
        let mut builder = Schema::builder();
        for field in &definition.fields {
            builder = if field.required {
                builder.field(&field.key, &field.label, field.kind)
            } else {
                builder.optional_field(&field.key, &field.label, field.kind)
            };
            if let Some(min) = field.min {
                builder = builder.validator(move |v| match v.as_f64() {
                    Some(n) if n < min => Err(format!("must be at least {}", min)),
                    _ => Ok(()),
                });
            }
            if let Some(max) = field.max {
                builder = builder.validator(move |v| match v.as_f64() {
                    Some(n) if n > max => Err(format!("must be at most {}", max)),
                    _ => Ok(()),
                });
            }
            if let Some(choices) = field.choices.clone() {
                builder = builder.validator(move |v| match v.as_str() {
                    Some(s) if !choices.iter().any(|c| c == s) => {
                        Err(MSG_INVALID_CHOICE.to_string())
                    }
                    _ => Ok(()),
                });
            }
        }
        builder.natural_key(definition.natural_key.clone()).build()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn label_to_key(&self, label: &str) -> Option<&str> {
        self.label_to_key.get(label).map(String::as_str)
    }

    pub fn key_to_label(&self, key: &str) -> Option<&str> {
        self.key_to_label.get(key).map(String::as_str)
    }

    /// 所有已知标签（按注册顺序）
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.label.as_str())
    }

    /// 记录的自然主键字段（用于 upsert）
    pub fn natural_key(&self) -> &[String] {
        &self.natural_key
    }

    /// 校验单行（输入已按 key 索引）
    ///
    /// # 返回
    /// - Ok(NormalizedRecord): 每个字段都有值（可选字段缺失为 null）
    /// - Err(FieldErrors): 字段 key → 错误列表
    pub fn validate_row(&self, row: &HashMap<String, String>) -> Result<NormalizedRecord, FieldErrors> {
        let mut record = NormalizedRecord::new();
        let mut errors = FieldErrors::new();

        for field in &self.fields {
            match field.clean(row.get(&field.key).map(String::as_str)) {
                Ok(value) => {
                    record.insert(field.key.clone(), value);
                }
                Err(messages) => {
                    errors.insert(field.key.clone(), messages);
                }
            }
        }

        if errors.is_empty() {
            Ok(record)
        } else {
            Err(errors)
        }
    }
}

// ==========================================
// SchemaBuilder
// ==========================================
#[derive(Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldSpec>,
    natural_key: Vec<String>,
}

impl SchemaBuilder {
    /// 注册必填字段
    pub fn field(self, key: &str, label: &str, kind: FieldKind) -> Self {
        self.push_field(key, label, kind, true)
    }

    /// 注册可选字段
    pub fn optional_field(self, key: &str, label: &str, kind: FieldKind) -> Self {
        self.push_field(key, label, kind, false)
    }

    fn push_field(mut self, key: &str, label: &str, kind: FieldKind, required: bool) -> Self {
        self.fields.push(FieldSpec {
            key: key.trim().to_string(),
            label: label.trim().to_string(),
            kind,
            required,
            validators: Vec::new(),
        });
        self
    }

    /// 为最近注册的字段追加校验器
    pub fn validator<F>(mut self, validate: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        if let Some(field) = self.fields.last_mut() {
            field.validators.push(Arc::new(validate));
        }
        self
    }

    pub fn natural_key<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.natural_key = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> ImportResult<Schema> {
        if self.fields.is_empty() {
            return Err(ImportError::SchemaDefinitionError("Schema 至少需要一个字段".to_string()));
        }

        let mut label_to_key = HashMap::new();
        let mut key_to_label = HashMap::new();
        for field in &self.fields {
            if field.key.is_empty() || field.label.is_empty() {
                return Err(ImportError::SchemaDefinitionError(
                    "字段 key 与标签不能为空".to_string(),
                ));
            }
            if key_to_label.insert(field.key.clone(), field.label.clone()).is_some() {
                return Err(ImportError::SchemaDefinitionError(format!(
                    "重复的字段 key: {}",
                    field.key
                )));
            }
            if label_to_key.insert(field.label.clone(), field.key.clone()).is_some() {
                return Err(ImportError::SchemaDefinitionError(format!(
                    "重复的字段标签: {}",
                    field.label
                )));
            }
        }

        let mut seen = HashSet::new();
        for key in &self.natural_key {
            if !key_to_label.contains_key(key) || !seen.insert(key) {
                return Err(ImportError::SchemaDefinitionError(format!(
                    "自然主键字段无效: {}",
                    key
                )));
            }
        }

        Ok(Schema {
            fields: self.fields,
            label_to_key,
            key_to_label,
            natural_key: self.natural_key,
        })
    }
}
