use crate::memory::ConversationKey;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Default)]
struct GuardState {
    held: HashSet<ConversationKey>,
    /// 每次会话重置加一；压缩只在读取历史时的纪元仍然有效时写入
    epochs: HashMap<ConversationKey, u64>,
}

/// 按会话的互斥：压缩用非阻塞的 [`try_acquire`](ConcurrencyGuard::try_acquire)，
/// 会话重置用会等待的 [`acquire`](ConcurrencyGuard::acquire)。
///
/// 不同 key 之间互不影响。租约 [`GuardLease`] 在 drop 时释放，
/// 因此持有者无论成功、返回错误还是 future 被丢弃都会释放。
#[derive(Clone, Default)]
pub struct ConcurrencyGuard {
    state: Arc<Mutex<GuardState>>,
    released: Arc<Notify>,
}

fn lock(state: &Mutex<GuardState>) -> MutexGuard<'_, GuardState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConcurrencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试获取 `key` 的租约；已被占用时返回 `None`
    pub fn try_acquire(&self, key: &ConversationKey) -> Option<GuardLease> {
        if !lock(&self.state).held.insert(key.clone()) {
            return None;
        }
        Some(GuardLease {
            guard: self.clone(),
            key: key.clone(),
        })
    }

    /// 等待直到拿到 `key` 的租约
    pub async fn acquire(&self, key: &ConversationKey) -> GuardLease {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            // 先登记等待再尝试，避免错过两者之间的释放通知
            released.as_mut().enable();
            if let Some(lease) = self.try_acquire(key) {
                return lease;
            }
            released.await;
        }
    }

    pub fn is_held(&self, key: &ConversationKey) -> bool {
        lock(&self.state).held.contains(key)
    }

    /// 会话当前的重置纪元，从 0 开始
    pub fn epoch(&self, key: &ConversationKey) -> u64 {
        lock(&self.state).epochs.get(key).copied().unwrap_or(0)
    }
}

/// 持有期间该会话的其他获取尝试都会失败或等待
pub struct GuardLease {
    guard: ConcurrencyGuard,
    key: ConversationKey,
}

impl GuardLease {
    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    /// 标记会话已重置：之前读取的历史快照全部失效
    pub fn invalidate(&self) -> u64 {
        let mut state = lock(&self.guard.state);
        let epoch = state.epochs.entry(self.key.clone()).or_default();
        *epoch += 1;
        *epoch
    }
}

impl Drop for GuardLease {
    fn drop(&mut self) {
        lock(&self.guard.state).held.remove(&self.key);
        self.guard.released.notify_waiters();
    }
}
