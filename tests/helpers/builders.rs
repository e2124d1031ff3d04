use grantor::clients::{self, Client, ClientAttributes};
use grantor::{OAuthContext, ScopeSet};

/// Builder for registering test OAuth clients
pub struct ClientBuilder {
    display_name: String,
    scope: ScopeSet,
    redirect_uri: Option<String>,
    revoked: bool,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            display_name: "Test Client".to_string(),
            scope: ScopeSet::parse("read write"),
            redirect_uri: Some("http://localhost:3000/callback".to_string()),
            revoked: false,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.display_name = name.to_string();
        self
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = ScopeSet::parse(scope);
        self
    }

    pub fn with_redirect_uri(mut self, uri: &str) -> Self {
        self.redirect_uri = Some(uri.to_string());
        self
    }

    pub fn without_redirect_uri(mut self) -> Self {
        self.redirect_uri = None;
        self
    }

    pub fn revoked(mut self) -> Self {
        self.revoked = true;
        self
    }

    pub async fn create(self, ctx: &OAuthContext) -> Client {
        let client = clients::register(
            ctx,
            ClientAttributes {
                display_name: self.display_name,
                redirect_uri: self.redirect_uri,
                scope: self.scope,
                ..Default::default()
            },
        )
        .await
        .expect("Failed to register test client");

        if self.revoked {
            clients::revoke_client(ctx, &client.client_id)
                .await
                .expect("Failed to revoke test client")
        } else {
            client
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Reload a client to observe its counters
pub async fn reload(ctx: &OAuthContext, client: &Client) -> Client {
    clients::get_client(ctx, &client.client_id)
        .await
        .expect("Failed to load client")
        .expect("Client not found")
}
