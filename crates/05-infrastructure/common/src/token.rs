//! 服务令牌
//!
//! 令牌是可请求能力的唯一标识，也是提供者查找的唯一键。
//! 令牌的相等性只取决于进程内唯一的数字标识，名称仅用于诊断。

use crate::metadata::TypeInfo;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// 无类型的服务令牌
#[derive(Clone)]
pub struct ServiceToken {
    id: u64,
    name: Arc<str>,
}

impl ServiceToken {
    /// 创建新的令牌，每次调用都产生一个不同的令牌
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name.into()),
        }
    }

    /// 令牌的唯一标识
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 诊断名称
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for ServiceToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceToken {}

impl Hash for ServiceToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ServiceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceToken({}#{})", self.name, self.id)
    }
}

impl fmt::Display for ServiceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// 带类型的服务令牌
///
/// 记录令牌所产生实例的类型，解析时据此进行向下转型。
pub struct Token<T: ?Sized> {
    inner: ServiceToken,
    type_info: TypeInfo,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: Send + Sync + 'static> Token<T> {
    /// 创建新的带类型令牌
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: ServiceToken::new(name),
            type_info: TypeInfo::of::<T>(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Token<T> {
    /// 获取无类型令牌
    pub fn service_token(&self) -> &ServiceToken {
        &self.inner
    }

    /// 令牌产生的实例类型
    pub fn type_info(&self) -> &TypeInfo {
        &self.type_info
    }

    /// 诊断名称
    pub fn name(&self) -> &str {
        self.inner.name()
    }
}

impl<T: ?Sized> Clone for Token<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            type_info: self.type_info.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> PartialEq for Token<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T: ?Sized> Eq for Token<T> {}

impl<T: ?Sized> fmt::Debug for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("token", &self.inner)
            .field("type", &self.type_info.name)
            .finish()
    }
}

impl<T: ?Sized> From<&Token<T>> for ServiceToken {
    fn from(token: &Token<T>) -> Self {
        token.inner.clone()
    }
}

impl<T: ?Sized> AsRef<ServiceToken> for Token<T> {
    fn as_ref(&self) -> &ServiceToken {
        &self.inner
    }
}
