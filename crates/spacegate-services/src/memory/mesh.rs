//! In-memory mesh directory and data transfer service

use super::respond;
use crate::*;
use dashmap::DashMap;
use parking_lot::Mutex;

/// Static directory of federated organisations
#[derive(Default)]
pub struct MemoryMeshDirectory {
    providers: DashMap<String, MeshProvider>,
}

impl MemoryMeshDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider: MeshProvider) {
        self.providers
            .insert(provider.domain.to_ascii_lowercase(), provider);
    }
}

#[async_trait::async_trait]
impl MeshDirectory for MemoryMeshDirectory {
    async fn get_info_by_domain(
        &self,
        req: GetInfoByDomainRequest,
    ) -> Result<GetInfoByDomainResponse> {
        match self.providers.get(&req.domain.to_ascii_lowercase()) {
            Some(provider) => Ok(GetInfoByDomainResponse {
                status: Status::ok(),
                provider: Some(provider.clone()),
            }),
            None => respond(Err(Status::not_found(format!(
                "no mesh provider for domain {}",
                req.domain
            )))),
        }
    }
}

/// Records transfer requests instead of moving data
#[derive(Default)]
pub struct MemoryDataTransfer {
    requests: Mutex<Vec<CreateTransferRequest>>,
    failure: Mutex<Option<Status>>,
}

impl MemoryDataTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent transfer requests answer with `status`
    pub fn fail_with(&self, status: Option<Status>) {
        *self.failure.lock() = status;
    }

    pub fn requests(&self) -> Vec<CreateTransferRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait::async_trait]
impl DataTransfer for MemoryDataTransfer {
    async fn create_transfer(&self, req: CreateTransferRequest) -> Result<CreateTransferResponse> {
        if let Some(status) = self.failure.lock().clone() {
            return respond(Err(status));
        }
        let transfer = TransferInfo {
            id: uuid::Uuid::new_v4().to_string(),
            status: TransferStatus::Queued,
            share_id: req.share_id.clone(),
        };
        self.requests.lock().push(req);
        Ok(CreateTransferResponse {
            status: Status::ok(),
            transfer: Some(transfer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_domain_lookup_ignores_case() {
        let mesh = MemoryMeshDirectory::new();
        mesh.register(MeshProvider {
            domain: "cesnet.cz".into(),
            name: "CESNET".into(),
            services: vec![],
        });
        let res = mesh
            .get_info_by_domain(GetInfoByDomainRequest {
                domain: "CESNET.cz".into(),
            })
            .await
            .unwrap();
        assert_eq!(res.provider.unwrap().name, "CESNET");

        let res = mesh
            .get_info_by_domain(GetInfoByDomainRequest {
                domain: "cern.ch".into(),
            })
            .await
            .unwrap();
        assert_eq!(res.status.code, Code::NotFound);
    }

    #[tokio::test]
    async fn test_transfers_are_recorded() {
        let transfers = MemoryDataTransfer::new();
        let res = transfers
            .create_transfer(CreateTransferRequest {
                src_target_uri: "webdav://token@remote".into(),
                dest_target_uri: "webdav://local".into(),
                share_id: "s1".into(),
            })
            .await
            .unwrap();
        assert_eq!(res.transfer.unwrap().status, TransferStatus::Queued);
        assert_eq!(transfers.requests().len(), 1);

        transfers.fail_with(Some(Status::internal("queue full")));
        let res = transfers
            .create_transfer(CreateTransferRequest::default())
            .await
            .unwrap();
        assert_eq!(res.status.code, Code::Internal);
        assert_eq!(transfers.requests().len(), 1);
    }
}
