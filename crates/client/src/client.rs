use std::sync::Arc;
use std::time::Duration;

use config::{ClientConfig, Transport};
use domain::{ClientEvent, ServerEvent, UserId};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    error::ClientError,
    history::{HistorySource, HttpHistory, ProfileState},
    routing::{run_dispatcher, Routes},
    session::ConversationSession,
    transport::{self, TransportLink, TransportTasks},
};

const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const SESSION_BUFFER: usize = 64;

/// 已登录用户的实时客户端
pub struct ChatClient {
    user_id: UserId,
    kind: Transport,
    outgoing: mpsc::Sender<ClientEvent>,
    routes: Routes,
    history: Arc<dyn HistorySource>,
    http_history: Option<HttpHistory>,
    typing_window: Duration,
    dispatcher: JoinHandle<()>,
    tasks: Option<TransportTasks>,
}

impl ChatClient {
    /// 按配置建立实时传输并以 `user_id` 注册在线状态
    pub async fn connect(config: &ClientConfig, user_id: UserId) -> Result<Self, ClientError> {
        let http = reqwest::Client::new();
        let link = transport::connect(&config.server_url, &config.transports, &http).await?;
        let history = HttpHistory::new(http, config.server_url.clone());

        let mut client = Self::connect_with(
            link,
            user_id,
            Arc::new(history.clone()),
            Duration::from_millis(config.typing_expiry_ms),
        )
        .await?;
        client.http_history = Some(history);
        Ok(client)
    }

    /// 在已建立的传输上完成 join，历史来源可替换
    pub async fn connect_with(
        link: TransportLink,
        user_id: UserId,
        history: Arc<dyn HistorySource>,
        typing_window: Duration,
    ) -> Result<Self, ClientError> {
        let (kind, outgoing, mut incoming, tasks) = link.into_parts();

        outgoing
            .send(ClientEvent::Join { user_id })
            .await
            .map_err(|_| ClientError::transport("transport closed before join"))?;

        let joined = tokio::time::timeout(JOIN_TIMEOUT, async {
            while let Some(event) = incoming.recv().await {
                match event {
                    ServerEvent::Joined { connection_id, .. } => return Ok(connection_id),
                    ServerEvent::Error { code, message } => {
                        return Err(ClientError::transport(format!(
                            "join rejected: {code}: {message}"
                        )))
                    }
                    other => tracing::debug!(event = ?other, "join 完成前收到事件，忽略"),
                }
            }
            Err(ClientError::transport("transport closed before join"))
        })
        .await
        .map_err(|_| ClientError::transport("timed out waiting for join"))??;

        tracing::info!(user_id = %user_id, connection_id = %joined, transport = ?kind, "已上线");

        let routes = Routes::default();
        let dispatcher = tokio::spawn(run_dispatcher(user_id, routes.clone(), incoming));

        Ok(Self {
            user_id,
            kind,
            outgoing,
            routes,
            history,
            http_history: None,
            typing_window,
            dispatcher,
            tasks: Some(tasks),
        })
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn transport(&self) -> Transport {
        self.kind
    }

    /// 打开与 `partner` 的会话：先订阅实时事件，再发起历史查询
    pub async fn open_conversation(&self, partner: UserId) -> ConversationSession {
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        let route_id = self.routes.register(partner, tx).await;

        let history = self.history.clone();
        let local = self.user_id;
        let fetch = async move { history.fetch_messages(local, partner).await };

        ConversationSession::spawn(
            local,
            partner,
            fetch,
            rx,
            self.outgoing.clone(),
            self.typing_window,
        )
        .with_route(self.routes.clone(), route_id)
    }

    /// 查询聊天对象资料；通过 HTTP 连接时可用
    pub async fn partner_profile(&self, partner: UserId) -> Result<ProfileState, ClientError> {
        match &self.http_history {
            Some(history) => history.partner_profile(partner).await,
            None => Err(ClientError::transport("profile lookup requires an http client")),
        }
    }

    /// 断开传输；长轮询会话同时通知服务器关闭
    pub async fn close(mut self) {
        self.dispatcher.abort();
        if let Some(tasks) = self.tasks.take() {
            tasks.shutdown().await;
        }
        tracing::info!(user_id = %self.user_id, "客户端已关闭");
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}
