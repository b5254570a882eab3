//! 元数据定义
//!
//! 提供令牌与组件所需的类型信息

use std::any::TypeId;

/// 类型信息
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    /// 类型名称
    pub name: String,
    /// 类型ID
    pub id: TypeId,
    /// 完整类型路径
    pub module_path: String,
}

impl TypeInfo {
    /// 从类型获取类型信息
    pub fn of<T: ?Sized + 'static>() -> Self {
        let full_name = std::any::type_name::<T>();
        Self {
            name: short_type_name(full_name).to_string(),
            id: TypeId::of::<T>(),
            module_path: full_name.to_string(),
        }
    }

    /// 检查是否为指定类型
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

/// 去掉模块路径，泛型参数保持原样
fn short_type_name(full_name: &str) -> &str {
    let head = full_name.split('<').next().unwrap_or(full_name);
    match head.rfind("::") {
        Some(index) => &full_name[index + 2..],
        None => full_name,
    }
}
