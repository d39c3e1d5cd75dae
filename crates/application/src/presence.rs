use domain::{ConnectionId, UserId};

use crate::connection::ConnectionHandle;

/// 在线目录trait
///
/// 用户标识与实时连接之间的双向映射。一个用户同一时刻最多对应一个连接
/// （后注册者覆盖前者），一个连接也不会同时挂在两个用户名下。
#[async_trait::async_trait]
pub trait PresenceDirectory: Send + Sync {
    /// 注册或覆盖用户的连接，返回被替换掉的旧连接（不会强制断开它）。
    async fn register(&self, user_id: UserId, connection: ConnectionHandle)
        -> Option<ConnectionHandle>;

    /// 查询用户当前的连接，不在线时返回 `None`。
    async fn lookup(&self, user_id: UserId) -> Option<ConnectionHandle>;

    /// 连接断开时按连接移除映射，幂等；返回原先映射到的用户。
    async fn remove(&self, connection_id: ConnectionId) -> Option<UserId>;

    /// 当前在线用户数
    async fn online_count(&self) -> usize;

    /// 清空目录（进程关闭时）
    async fn clear(&self);
}

/// 内存实现的在线目录
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct Directory {
        by_user: HashMap<UserId, ConnectionHandle>,
        by_connection: HashMap<ConnectionId, UserId>,
    }

    /// 两个方向的映射放在同一把锁下，保证对单个用户的操作可线性化；
    /// 锁只在修改映射期间持有，从不跨越网络 I/O。
    #[derive(Default)]
    pub struct InMemoryPresenceDirectory {
        inner: RwLock<Directory>,
    }

    impl InMemoryPresenceDirectory {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait::async_trait]
    impl PresenceDirectory for InMemoryPresenceDirectory {
        async fn register(
            &self,
            user_id: UserId,
            connection: ConnectionHandle,
        ) -> Option<ConnectionHandle> {
            let mut directory = self.inner.write().await;
            let connection_id = connection.id();

            // 同一连接改用另一个身份 join：先解除旧身份
            if let Some(previous_user) = directory.by_connection.get(&connection_id).copied() {
                if previous_user != user_id {
                    directory.by_user.remove(&previous_user);
                }
            }

            let replaced = directory.by_user.insert(user_id, connection);
            directory.by_connection.insert(connection_id, user_id);

            match replaced {
                Some(old) if old.id() != connection_id => {
                    directory.by_connection.remove(&old.id());
                    tracing::info!(
                        user_id = %user_id,
                        old_connection = %old.id(),
                        new_connection = %connection_id,
                        "用户重新注册，旧连接不再可达"
                    );
                    Some(old)
                }
                _ => None,
            }
        }

        async fn lookup(&self, user_id: UserId) -> Option<ConnectionHandle> {
            self.inner.read().await.by_user.get(&user_id).cloned()
        }

        async fn remove(&self, connection_id: ConnectionId) -> Option<UserId> {
            let mut directory = self.inner.write().await;
            let user_id = directory.by_connection.remove(&connection_id)?;

            let still_current = directory
                .by_user
                .get(&user_id)
                .is_some_and(|handle| handle.id() == connection_id);
            if still_current {
                directory.by_user.remove(&user_id);
            }

            Some(user_id)
        }

        async fn online_count(&self) -> usize {
            self.inner.read().await.by_user.len()
        }

        async fn clear(&self) {
            let mut directory = self.inner.write().await;
            directory.by_user.clear();
            directory.by_connection.clear();
        }
    }
}
