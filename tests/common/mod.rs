#![allow(dead_code)]

use constcat::concat;
use helpdesk::api;
use reqwest::StatusCode;
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:3000";

pub const IT: u128 = 1;
pub const ACCOUNTING: u128 = 2;

pub struct Client {
    inner: reqwest::Client,
    pub auth_token: Option<String>,
}

impl Client {
    pub fn new() -> Self {
        Self {
            inner: reqwest::Client::new(),
            auth_token: None,
        }
    }

    pub async fn auth(mut self, login: &str, password: &str) -> Self {
        const URL: &str = concat!(BASE_URL, "/auth");

        self.auth_token = Some(
            self.inner
                .post(URL)
                .json(&json!({
                    "login": login,
                    "password": password,
                }))
                .send()
                .await
                .expect("failed to send a request")
                .error_for_status()
                .expect("wrong status code")
                .text()
                .await
                .expect("failed to get a response"),
        );

        self
    }

    pub async fn try_auth(
        &self,
        login: &str,
        password: &str,
    ) -> Result<String, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/auth");

        Ok(self
            .inner
            .post(URL)
            .json(&json!({
                "login": login,
                "password": password,
            }))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .text()
            .await
            .expect("failed to get a response"))
    }

    pub async fn user(&self) -> Result<api::user::Profile, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/user");

        let mut req = self.inner.get(URL);
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        Ok(req
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::user::Profile>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn departments(
        &self,
    ) -> Result<Vec<api::Department>, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/department");

        let mut req = self.inner.get(URL);
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        Ok(req
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<Vec<api::Department>>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn add_attachment(
        &self,
        name: &str,
    ) -> Result<api::Attachment, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/attachment");

        let mut req = self.inner.post(URL);
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        Ok(req
            .json(&json!({ "name": name }))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::Attachment>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn list_tickets(
        &self,
        folder: &str,
        filter: &str,
    ) -> Result<api::ticket::List, StatusCode> {
        self.get_tickets(&format!(
            "folder={folder}&offset=0&limit=1000{filter}"
        ))
        .await
    }

    pub async fn list_tickets_page(
        &self,
        folder: &str,
        offset: usize,
        limit: usize,
    ) -> Result<api::ticket::List, StatusCode> {
        self.get_tickets(&format!(
            "folder={folder}&offset={offset}&limit={limit}"
        ))
        .await
    }

    async fn get_tickets(
        &self,
        query: &str,
    ) -> Result<api::ticket::List, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/ticket");

        let mut req = self.inner.get(format!("{URL}?{query}"));
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        Ok(req
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::ticket::List>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn add_ticket(
        &self,
        department: u128,
        title: &str,
        description: &str,
    ) -> Result<api::ticket::Detail, StatusCode> {
        self.add_ticket_with(json!({
            "department": api::department::Id::from(department),
            "title": title,
            "description": description,
        }))
        .await
    }

    pub async fn add_ticket_with(
        &self,
        body: Value,
    ) -> Result<api::ticket::Detail, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/ticket");

        let mut req = self.inner.post(URL);
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        Ok(req
            .json(&body)
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::ticket::Detail>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn get_ticket(
        &self,
        id: api::ticket::Id,
    ) -> Result<api::ticket::Detail, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/ticket");

        let mut req = self.inner.get(format!("{URL}/{id}"));
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        Ok(req
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::ticket::Detail>()
            .await
            .expect("failed to get a response"))
    }

    async fn edit_ticket(
        &self,
        id: api::ticket::Id,
        op: Value,
    ) -> Result<api::ticket::Detail, StatusCode> {
        const URL: &str = concat!(BASE_URL, "/ticket");

        let mut req = self.inner.patch(format!("{URL}/{id}"));
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        Ok(req
            .json(&op)
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::ticket::Detail>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn assign_executor(
        &self,
        id: api::ticket::Id,
        executor: u128,
    ) -> Result<api::ticket::Detail, StatusCode> {
        self.edit_ticket(
            id,
            json!({
                "op": "assignExecutor",
                "data": {
                    "executor": api::user::Id::from(executor),
                }
            }),
        )
        .await
    }

    pub async fn delay_ticket(
        &self,
        id: api::ticket::Id,
    ) -> Result<api::ticket::Detail, StatusCode> {
        self.edit_ticket(id, json!({ "op": "delay" })).await
    }

    pub async fn deny_ticket(
        &self,
        id: api::ticket::Id,
    ) -> Result<api::ticket::Detail, StatusCode> {
        self.edit_ticket(id, json!({ "op": "deny" })).await
    }

    pub async fn refresh_ticket(
        &self,
        id: api::ticket::Id,
    ) -> Result<api::ticket::Detail, StatusCode> {
        self.edit_ticket(id, json!({ "op": "refresh" })).await
    }

    pub async fn set_ticket_done(
        &self,
        id: api::ticket::Id,
    ) -> Result<api::ticket::Detail, StatusCode> {
        self.edit_ticket(id, json!({ "op": "setDone" })).await
    }

    pub async fn complete_ticket(
        &self,
        id: api::ticket::Id,
    ) -> Result<api::ticket::Detail, StatusCode> {
        self.edit_ticket(id, json!({ "op": "complete" })).await
    }

    pub async fn cancel_ticket(
        &self,
        id: api::ticket::Id,
    ) -> Result<api::ticket::Detail, StatusCode> {
        self.edit_ticket(id, json!({ "op": "cancel" })).await
    }
}
