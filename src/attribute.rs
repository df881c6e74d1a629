// 该文件是 Tianyan （天眼） 项目的一部分。
// src/attribute.rs - 人体属性编码到标签的映射
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const UNCERTAIN: &str = "Uncertain";
pub const UNKNOWN_CATEGORY_PLACEHOLDER: &str = "<unknown>";

const COLORS: &[&str] = &[
  UNCERTAIN, "Red", "Orange", "Yellow", "Green", "Blue", "Purple", "Pink", "Black", "White",
  "Gray", "Brown",
];
const NO_YES: &[&str] = &[UNCERTAIN, "No", "Yes"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AttributeError {
  #[error("未知的属性类别: {0}")]
  UnknownCategory(String),
  #[error("属性 {category} 的编码 {code} 超出范围 (共 {len} 个标签)")]
  CodeOutOfRange {
    category: AttributeCategory,
    code: u8,
    len: usize,
  },
}

macro_rules! attribute_categories {
  ($($variant:ident => $name:literal),* $(,)?) => {
    /// 人体属性类别，共 25 个
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum AttributeCategory {
      $($variant),*
    }

    impl AttributeCategory {
      pub const ALL: [AttributeCategory; 25] = [$(AttributeCategory::$variant),*];

      pub fn name(self) -> &'static str {
        match self {
          $(AttributeCategory::$variant => $name),*
        }
      }
    }

    impl FromStr for AttributeCategory {
      type Err = AttributeError;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
          $($name => Ok(AttributeCategory::$variant),)*
          _ => Err(AttributeError::UnknownCategory(s.to_string())),
        }
      }
    }
  };
}

attribute_categories! {
  IsHuman => "isHuman",
  Age => "age",
  Gender => "gender",
  Race => "race",
  Umbrella => "umbrella",
  Headwear => "headwear",
  Glasses => "glasses",
  FaceMask => "faceMask",
  Smoke => "smoke",
  CarryingItem => "carryingItem",
  Cellphone => "cellphone",
  SafetyClothing => "safetyClothing",
  UpperWear => "upperWear",
  UpperColor => "upperColor",
  UpperWearFg => "upperWearFg",
  UpperWearTexture => "upperWearTexture",
  Bag => "bag",
  SafetyRope => "safetyRope",
  UpperCut => "upperCut",
  LowerWear => "lowerWear",
  LowerColor => "lowerColor",
  Vehicle => "vehicle",
  LowerCut => "lowerCut",
  Occlusion => "occlusion",
  Orientation => "orientation",
}

impl AttributeCategory {
  /// 该类别的标签表，下标即编码，0 总是 "Uncertain"
  pub fn labels(self) -> &'static [&'static str] {
    use AttributeCategory::*;
    match self {
      IsHuman => &[UNCERTAIN, "Normal", "Abnormal"],
      Age => &[
        UNCERTAIN,
        "Toddler",
        "Teenager",
        "Youth",
        "Middle-aged",
        "Elderly",
      ],
      Gender => &[UNCERTAIN, "Male", "Female"],
      Race => &[
        UNCERTAIN,
        "East Asia",
        "Caucasian",
        "African",
        "South Asia",
      ],
      Headwear => &[UNCERTAIN, "No", "hat", "Helmet"],
      Glasses => &[UNCERTAIN, "No", "Glasses", "Sunglasses"],
      UpperWear => &[UNCERTAIN, "Long-sleeve", "Short-sleeve"],
      UpperColor | LowerColor => COLORS,
      UpperWearFg => &[
        UNCERTAIN,
        "T-shirt",
        "Sleeveless Top",
        "Shirt",
        "Suit",
        "Sweater",
        "Jacket",
        "Down Jacket",
        "Trench Coat",
        "Coat",
      ],
      UpperWearTexture => &[
        UNCERTAIN,
        "Solid Color",
        "Pattern",
        "Small Floral",
        "Stripes or Plaid",
      ],
      Bag => &[UNCERTAIN, "No", "Crossbody Bag", "Backpack"],
      LowerWear => &[
        UNCERTAIN,
        "Long Pants",
        "Shorts",
        "Long Dress",
        "Short Skirt",
      ],
      Vehicle => &[UNCERTAIN, "No", "Motorcycle", "Bicycle", "Tricycle"],
      Occlusion => &[UNCERTAIN, "No", "Mild Occlusion", "Heavy Occlusion"],
      Orientation => &[UNCERTAIN, "Front", "Back", "Right Side", "Left Side"],
      Umbrella | FaceMask | Smoke | CarryingItem | Cellphone | SafetyClothing | SafetyRope
      | UpperCut | LowerCut => NO_YES,
    }
  }

  pub fn label(self, code: u8) -> Result<&'static str, AttributeError> {
    let labels = self.labels();
    labels
      .get(code as usize)
      .copied()
      .ok_or(AttributeError::CodeOutOfRange {
        category: self,
        code,
        len: labels.len(),
      })
  }
}

impl fmt::Display for AttributeCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// 按类别名与编码查找标签
pub fn decode(category: &str, code: u8) -> Result<&'static str, AttributeError> {
  category.parse::<AttributeCategory>()?.label(code)
}

/// 与 [`decode`] 相同，但失败时返回醒目的占位文本而不是错误
pub fn label_or_placeholder(category: &str, code: u8) -> Cow<'static, str> {
  match decode(category, code) {
    Ok(label) => Cow::Borrowed(label),
    Err(e @ AttributeError::UnknownCategory(_)) => {
      warn!("{}", e);
      Cow::Borrowed(UNKNOWN_CATEGORY_PLACEHOLDER)
    }
    Err(e @ AttributeError::CodeOutOfRange { .. }) => {
      warn!("{}", e);
      Cow::Owned(format!("<invalid:{}>", code))
    }
  }
}

/// 引擎输出的人体属性编码
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BodyAttributes {
  pub is_human: u8,
  pub age: u8,
  pub gender: u8,
  pub race: u8,
  pub umbrella: u8,
  pub headwear: u8,
  pub glasses: u8,
  pub face_mask: u8,
  pub smoke: u8,
  pub carrying_item: u8,
  pub cellphone: u8,
  pub safety_clothing: u8,
  pub upper_wear: u8,
  pub upper_color: u8,
  pub upper_wear_fg: u8,
  pub upper_wear_texture: u8,
  pub bag: u8,
  pub safety_rope: u8,
  pub upper_cut: u8,
  pub lower_wear: u8,
  pub lower_color: u8,
  pub vehicle: u8,
  pub lower_cut: u8,
  pub occlusion: u8,
  pub orientation: u8,
}

impl BodyAttributes {
  /// 按日志输出顺序列出 (类别, 编码)
  pub fn codes(&self) -> [(AttributeCategory, u8); 25] {
    use AttributeCategory::*;
    [
      (Umbrella, self.umbrella),
      (Headwear, self.headwear),
      (Glasses, self.glasses),
      (FaceMask, self.face_mask),
      (Smoke, self.smoke),
      (CarryingItem, self.carrying_item),
      (Cellphone, self.cellphone),
      (SafetyClothing, self.safety_clothing),
      (UpperWear, self.upper_wear),
      (UpperColor, self.upper_color),
      (UpperWearFg, self.upper_wear_fg),
      (UpperWearTexture, self.upper_wear_texture),
      (Bag, self.bag),
      (SafetyRope, self.safety_rope),
      (UpperCut, self.upper_cut),
      (LowerWear, self.lower_wear),
      (LowerColor, self.lower_color),
      (Vehicle, self.vehicle),
      (LowerCut, self.lower_cut),
      (Occlusion, self.occlusion),
      (Orientation, self.orientation),
      (IsHuman, self.is_human),
      (Gender, self.gender),
      (Race, self.race),
      (Age, self.age),
    ]
  }

  /// 解码全部属性，越界编码以占位文本代替
  pub fn labels(&self) -> Vec<(AttributeCategory, Cow<'static, str>)> {
    self
      .codes()
      .into_iter()
      .map(|(category, code)| (category, label_or_placeholder(category.name(), code)))
      .collect()
  }
}
