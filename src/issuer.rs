//! 從 CSR 到已簽發憑證的完整流程。

use std::sync::Arc;

use log::{info, warn};

use crate::{
    account::Account,
    authorization::{Authorization, AuthorizationStatus},
    certificate::Certificate,
    challenge::{key_authorization, ChallengeType},
    config::Config,
    csr::Csr,
    error::{Error, Result},
    key_pair::AccountKey,
    order::Order,
    payload::ChallengeValidationPayload,
    poll::{poll_until_settled, Clock, PollPolicy, SystemClock},
    responder::{ChallengeResponder, Dns01Responder, Http01Responder, ScriptProvisioner},
    session::Session,
    signature::Signer,
    transport::{HttpClient, ReqwestClient},
};

/// 驅動一次憑證申請：註冊帳戶、建立訂單、逐一完成授權、下訂並下載憑證。
pub struct Issuer {
    config: Config,
    signer: Arc<dyn Signer>,
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    responder: Box<dyn ChallengeResponder>,
    poll_policy: PollPolicy,
}

impl Issuer {
    /// 依設定載入帳戶金鑰，並建立 reqwest 客戶端與對應的挑戰回應器。
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        info!("Parsing account key...");
        let signer: Arc<dyn Signer> = Arc::new(AccountKey::from_file(&config.account_key)?);
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new(config.timeout())?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

        let challenge = &config.challenge;
        let responder: Box<dyn ChallengeResponder> = match challenge.challenge_type {
            ChallengeType::Http01 => {
                let acme_dir = challenge.acme_dir.clone().ok_or_else(|| {
                    Error::Config("http-01 challenges require an acme-dir".to_string())
                })?;
                Box::new(
                    Http01Responder::new(acme_dir, http.clone())
                        .check_port(challenge.check_port)
                        .disable_check(challenge.disable_check),
                )
            }
            ChallengeType::Dns01 => Box::new(Dns01Responder::new(
                Box::new(ScriptProvisioner::new(&challenge.dns_script)),
                challenge.dns_provider.clone(),
                challenge.dns_propagation_wait(),
                clock.clone(),
            )),
        };

        Ok(Self::with_parts(config, signer, http, clock, responder))
    }

    /// 以自行提供的元件組裝。
    pub fn with_parts(
        config: Config,
        signer: Arc<dyn Signer>,
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        responder: Box<dyn ChallengeResponder>,
    ) -> Self {
        Self {
            config,
            signer,
            http,
            clock,
            responder,
            poll_policy: PollPolicy::default(),
        }
    }

    /// 替換輪詢策略，預設為每 2 秒一次、上限 3600 秒。
    pub fn poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    /// 讀取設定中的 CSR 並為它簽發憑證。
    pub fn issue(&self) -> Result<Certificate> {
        info!("Parsing CSR...");
        let csr = Csr::from_file(&self.config.csr)?;
        self.issue_for(&csr)
    }

    /// 為已解析的 CSR 走完整個簽發流程。
    ///
    /// 依序取得目錄、註冊帳戶、建立訂單、逐一完成授權、提交 CSR、輪詢訂單，
    /// 最後下載憑證鏈。任何一步失敗都會立即中止，不會自動重試。
    ///
    /// # 參數
    ///
    /// - `csr`: 要簽發的 CSR，其 CN 與 DNS SAN 決定訂單中的網域
    ///
    /// # 回傳
    ///
    /// 成功時回傳 CA 簽發的 PEM 憑證鏈，否則回傳第一個遇到的錯誤。
    pub fn issue_for(&self, csr: &Csr) -> Result<Certificate> {
        let domains = csr.domains();
        info!(
            "Found domains: {}",
            domains.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
        );

        info!("Getting directory...");
        let mut session = Session::connect(
            self.http.clone(),
            self.signer.clone(),
            &self.config.directory_url,
        )?;
        info!("Directory found!");

        info!("Registering account...");
        Account::register(&mut session, self.config.contact.as_deref())?;

        info!("Creating new order...");
        let mut order = Order::create(&mut session, domains)?;

        for url in order.authorizations.clone() {
            self.authorize(&mut session, &url)?;
        }

        info!("Signing certificate...");
        order.finalize(&mut session, &csr.to_der()?)?;
        order.poll(&mut session, &*self.clock, &self.poll_policy)?;
        let certificate = order.download_certificate(&mut session)?;
        info!("Certificate signed!");
        Ok(certificate)
    }

    /// 完成單一授權。
    ///
    /// 已經 valid 的授權直接略過；否則佈署挑戰、自我檢查、通知 CA 並輪詢結果。
    /// 佈署成功後無論結果如何都會清除。
    pub fn authorize(&self, session: &mut Session, url: &str) -> Result<Authorization> {
        let authorization = Authorization::fetch(session, url)?;
        let domain = authorization.domain().to_owned();

        if authorization.status == AuthorizationStatus::Valid {
            info!("Already verified: {}, skipping...", domain);
            return Ok(authorization);
        }
        info!("Verifying {}...", domain);

        let challenge_type = self.responder.challenge_type();
        let challenge = authorization
            .challenge(challenge_type)
            .ok_or_else(|| Error::UnsupportedChallenge {
                domain: domain.clone(),
                challenge_type: challenge_type.to_string(),
            })?;
        let challenge_url = challenge.url.clone();
        let token = challenge.sanitized_token();
        let key_auth = key_authorization(&challenge.token, &self.signer.jwk().thumbprint()?);

        self.responder.prepare(&domain, &token, &key_auth)?;
        let outcome = self
            .validate(session, &domain, &token, &key_auth, &challenge_url, url)
            .and_then(|authorization| match authorization.status {
                AuthorizationStatus::Valid => Ok(authorization),
                _ => Err(Error::ChallengeFailed {
                    domain: domain.clone(),
                    authorization: authorization.raw,
                }),
            });
        let cleanup = self.responder.cleanup(&domain, &token, &key_auth);

        match (outcome, cleanup) {
            (Ok(authorization), Ok(())) => {
                info!("{} verified!", domain);
                Ok(authorization)
            }
            (Ok(_), Err(err)) | (Err(err), Ok(())) => Err(err),
            (Err(err), Err(cleanup_err)) => {
                warn!("Cleanup for {} failed: {}", domain, cleanup_err);
                Err(err)
            }
        }
    }

    fn validate(
        &self,
        session: &mut Session,
        domain: &str,
        token: &str,
        key_auth: &str,
        challenge_url: &str,
        authorization_url: &str,
    ) -> Result<Authorization> {
        if !self.responder.verify(domain, token, key_auth)? {
            return Err(Error::ChallengeSetup {
                domain: domain.to_owned(),
                reason: "self-check did not return the key authorization".to_string(),
            });
        }
        session.post(challenge_url, &ChallengeValidationPayload::new())?;
        poll_until_settled(session, &*self.clock, &self.poll_policy, authorization_url)
    }
}
