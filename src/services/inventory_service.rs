use std::sync::Arc;
use tonic::{Request, Response, Status};

use crate::error::AppError;
use crate::models::{Category, Highlight, Record, RecordId, RecordSet};
use crate::proto::inventory::inventory_service_server::InventoryService;
use crate::proto::inventory::{
    AdjustQuantityRequest, CreateItemRequest, DeleteItemRequest, Empty, Item, ItemResponse,
    ListItemsRequest, ListItemsResponse, LoginRequest, LoginResponse, ReplaceItemsRequest,
    ReplaceItemsResponse, Summary,
};
use crate::session::{token_from_metadata, Session, SessionRegistry};
use crate::sync::SyncEngine;

/// Count of a new item when the request leaves it unset
const DEFAULT_COUNT: i64 = 1;

pub struct InventoryServiceImpl {
    engine: Arc<SyncEngine>,
    sessions: Arc<SessionRegistry>,
}

impl InventoryServiceImpl {
    pub fn new(engine: Arc<SyncEngine>, sessions: Arc<SessionRegistry>) -> Self {
        Self { engine, sessions }
    }

    async fn session<T>(&self, request: &Request<T>) -> Result<Session, Status> {
        let token = token_from_metadata(request.metadata())?;
        Ok(self.sessions.resolve(&token).await?)
    }

    fn record_to_proto(record: &Record) -> Item {
        Item {
            id: record.id.to_string(),
            owner: record.owner.clone(),
            name: record.name.clone(),
            category: record.category.label().to_string(),
            count: i64::from(record.count),
            unit_mass: record.unit_mass,
            image_path: record.image_path.clone(),
            highlight: record.highlight.label().to_string(),
            highlight_color: record.highlight.color_hex().to_string(),
        }
    }

    fn summary_of(set: &RecordSet) -> Summary {
        Summary {
            total_items: set.total_items() as i64,
            total_mass_kg: set.total_mass_kg(),
            categories: set.categories(),
        }
    }

    fn parse_count(count: i64) -> Result<u32, AppError> {
        u32::try_from(count).map_err(|_| {
            AppError::InvalidInput(format!("count must be between 0 and {}", u32::MAX))
        })
    }

    fn parse_unit_mass(unit_mass: f64) -> Result<f64, AppError> {
        if unit_mass.is_finite() && unit_mass >= 0.0 {
            Ok(unit_mass)
        } else {
            Err(AppError::InvalidInput("unit_mass must be a non-negative number".to_string()))
        }
    }

    fn parse_highlight(label: &str) -> Result<Highlight, AppError> {
        if label.trim().is_empty() {
            return Ok(Highlight::None);
        }
        Highlight::from_label(label)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown highlight '{}'", label)))
    }

    fn parse_category(label: &str) -> Category {
        if label.trim().is_empty() {
            Category::default()
        } else {
            Category::from_label(label)
        }
    }

    fn parse_id(id: &str) -> Result<RecordId, AppError> {
        RecordId::parse(id)
            .ok_or_else(|| AppError::InvalidInput(format!("invalid item id '{}'", id)))
    }

    /// Table rows as edited by the client; owner and id are re-derived.
    fn record_from_proto(item: Item) -> Result<Record, AppError> {
        Ok(Record {
            id: RecordId::nil(),
            owner: String::new(),
            category: Self::parse_category(&item.category),
            count: Self::parse_count(item.count)?,
            unit_mass: Self::parse_unit_mass(item.unit_mass)?,
            highlight: Self::parse_highlight(&item.highlight)?,
            name: item.name,
            image_path: item.image_path,
        })
    }

}

#[tonic::async_trait]
impl InventoryService for InventoryServiceImpl {
    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> Result<Response<LoginResponse>, Status> {
        let req = request.into_inner();
        let session = self.sessions.login(&req.username).await?;

        Ok(Response::new(LoginResponse {
            session_token: session.token,
            owner: session.owner,
        }))
    }

    async fn logout(&self, request: Request<Empty>) -> Result<Response<Empty>, Status> {
        let token = token_from_metadata(request.metadata())?;
        self.sessions.logout(&token).await?;
        self.engine.invalidate_connection().await;

        Ok(Response::new(Empty {}))
    }

    async fn list_items(
        &self,
        request: Request<ListItemsRequest>,
    ) -> Result<Response<ListItemsResponse>, Status> {
        let session = self.session(&request).await?;
        let req = request.into_inner();

        let (set, warning) = match self.engine.try_load(&session.owner).await {
            Ok(set) => (set, String::new()),
            Err(e) => {
                tracing::warn!("ListItems degraded for owner={}: {}", session.owner, e);
                (RecordSet::empty(session.owner.as_str()), e.to_string())
            }
        };

        let items = set
            .with_categories(&req.categories)
            .into_iter()
            .map(Self::record_to_proto)
            .collect();

        Ok(Response::new(ListItemsResponse {
            items,
            summary: Some(Self::summary_of(&set)),
            warning,
        }))
    }

    async fn create_item(
        &self,
        request: Request<CreateItemRequest>,
    ) -> Result<Response<ItemResponse>, Status> {
        let session = self.session(&request).await?;
        let req = request.into_inner();

        let name = req.name.trim();
        if name.is_empty() {
            return Err(Status::invalid_argument("name is required"));
        }

        let record = Record {
            category: Self::parse_category(&req.category),
            count: Self::parse_count(req.count.unwrap_or(DEFAULT_COUNT))?,
            unit_mass: Self::parse_unit_mass(req.unit_mass)?,
            highlight: Self::parse_highlight(&req.highlight)?,
            ..Record::new(session.owner.as_str(), name)
        };

        let item = self
            .engine
            .update(&session.owner, |set| Ok(Self::record_to_proto(set.push(record))))
            .await?;

        tracing::info!("Item created: owner={}, name={}", session.owner, item.name);
        Ok(Response::new(ItemResponse { item: Some(item) }))
    }

    async fn replace_items(
        &self,
        request: Request<ReplaceItemsRequest>,
    ) -> Result<Response<ReplaceItemsResponse>, Status> {
        let session = self.session(&request).await?;
        let req = request.into_inner();

        let records = req
            .items
            .into_iter()
            .map(Self::record_from_proto)
            .collect::<Result<Vec<_>, _>>()?;
        let response = self
            .engine
            .update(&session.owner, |set| {
                set.replace_all(records);
                Ok(ReplaceItemsResponse {
                    items: set.iter().map(Self::record_to_proto).collect(),
                    summary: Some(Self::summary_of(set)),
                })
            })
            .await?;

        Ok(Response::new(response))
    }

    async fn adjust_quantity(
        &self,
        request: Request<AdjustQuantityRequest>,
    ) -> Result<Response<ItemResponse>, Status> {
        let session = self.session(&request).await?;
        let req = request.into_inner();
        let id = Self::parse_id(&req.id)?;

        let item = self
            .engine
            .update(&session.owner, |set| {
                Ok(Self::record_to_proto(set.adjust_quantity(id, i64::from(req.delta))?))
            })
            .await?;

        Ok(Response::new(ItemResponse { item: Some(item) }))
    }

    async fn delete_item(
        &self,
        request: Request<DeleteItemRequest>,
    ) -> Result<Response<Empty>, Status> {
        let session = self.session(&request).await?;
        let req = request.into_inner();
        let id = Self::parse_id(&req.id)?;

        let removed = self.engine.update(&session.owner, |set| set.remove(id)).await?;

        tracing::info!("Item deleted: owner={}, name={}", session.owner, removed.name);
        Ok(Response::new(Empty {}))
    }

    async fn get_summary(&self, request: Request<Empty>) -> Result<Response<Summary>, Status> {
        let session = self.session(&request).await?;
        let set = self.engine.load(&session.owner).await;
        Ok(Response::new(Self::summary_of(&set)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HEADER;
    use crate::session::SESSION_METADATA_KEY;
    use crate::sheets::connection::DEFAULT_CONNECTION_TTL;
    use crate::sheets::{
        ConnectionCache, MemoryConnector, MemoryTable, StoreConnector, TableStore,
    };
    use crate::AppResult;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tonic::Code;

    fn service_with(grid: Vec<Vec<String>>) -> (InventoryServiceImpl, Arc<MemoryTable>) {
        let table = Arc::new(MemoryTable::with_grid("Tabelle1", grid));
        let connector = Arc::new(MemoryConnector::new(table.clone()));
        let engine = SyncEngine::new(ConnectionCache::new(connector, DEFAULT_CONNECTION_TTL));
        let service = InventoryServiceImpl::new(Arc::new(engine), Arc::new(SessionRegistry::new()));
        (service, table)
    }

    fn authed<T>(token: &str, message: T) -> Request<T> {
        let mut request = Request::new(message);
        request
            .metadata_mut()
            .insert(SESSION_METADATA_KEY, token.parse().unwrap());
        request
    }

    async fn login(service: &InventoryServiceImpl, username: &str) -> String {
        service
            .login(Request::new(LoginRequest {
                username: username.to_string(),
            }))
            .await
            .unwrap()
            .into_inner()
            .session_token
    }

    fn create(name: &str, count: i64, unit_mass: f64) -> CreateItemRequest {
        CreateItemRequest {
            name: name.to_string(),
            category: "Batterie".to_string(),
            count: Some(count),
            unit_mass,
            highlight: String::new(),
        }
    }

    #[tokio::test]
    async fn test_requires_session() {
        let (service, _) = service_with(Vec::new());
        let err = service
            .list_items(Request::new(ListItemsRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
    }

    #[tokio::test]
    async fn test_create_list_and_summary() {
        let (service, table) = service_with(Vec::new());
        let token = login(&service, "anna").await;

        let item = service
            .create_item(authed(&token, create("Vulkan", 2, 10.0)))
            .await
            .unwrap()
            .into_inner()
            .item
            .unwrap();
        assert_eq!(item.owner, "anna");
        assert_eq!(item.highlight, "Kein");
        service
            .create_item(authed(&token, create("Fontäne", 3, 5.0)))
            .await
            .unwrap();

        let list = service
            .list_items(authed(&token, ListItemsRequest::default()))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(list.items.len(), 2);
        assert!(list.warning.is_empty());
        let summary = list.summary.unwrap();
        assert_eq!(summary.total_items, 5);
        assert!((summary.total_mass_kg - 0.035).abs() < 1e-12);

        let grid = table.snapshot().await;
        assert_eq!(grid[0], HEADER);
        assert_eq!(grid.len(), 3);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let (service, _) = service_with(Vec::new());
        let token = login(&service, "anna").await;

        let err = service
            .create_item(authed(&token, create("  ", 1, 1.0)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let err = service
            .create_item(authed(&token, create("Vulkan", -1, 1.0)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let mut bad_highlight = create("Vulkan", 1, 1.0);
        bad_highlight.highlight = "Lila".to_string();
        let err = service
            .create_item(authed(&token, bad_highlight))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_adjust_quantity_by_id_with_duplicate_names() {
        let (service, _) = service_with(Vec::new());
        let token = login(&service, "anna").await;
        service
            .create_item(authed(&token, create("Vulkan", 0, 1.0)))
            .await
            .unwrap();
        let second = service
            .create_item(authed(&token, create("Vulkan", 5, 1.0)))
            .await
            .unwrap()
            .into_inner()
            .item
            .unwrap();

        let adjusted = service
            .adjust_quantity(authed(
                &token,
                AdjustQuantityRequest {
                    id: second.id.clone(),
                    delta: 1,
                },
            ))
            .await
            .unwrap()
            .into_inner()
            .item
            .unwrap();
        assert_eq!(adjusted.count, 6);

        let list = service
            .list_items(authed(&token, ListItemsRequest::default()))
            .await
            .unwrap()
            .into_inner();
        let first_id = list.items[0].id.clone();
        assert_eq!(list.items[0].count, 0);

        let floored = service
            .adjust_quantity(authed(&token, AdjustQuantityRequest { id: first_id, delta: -1 }))
            .await
            .unwrap()
            .into_inner()
            .item
            .unwrap();
        assert_eq!(floored.count, 0);
    }

    #[tokio::test]
    async fn test_partitions_are_isolated() {
        let (service, _) = service_with(Vec::new());
        let anna = login(&service, "anna").await;
        let ben = login(&service, "ben").await;

        service
            .create_item(authed(&anna, create("Vulkan", 1, 1.0)))
            .await
            .unwrap();
        service
            .replace_items(authed(&ben, ReplaceItemsRequest { items: Vec::new() }))
            .await
            .unwrap();

        let list = service
            .list_items(authed(&anna, ListItemsRequest::default()))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(list.items.len(), 1);

        let list = service
            .list_items(authed(&ben, ListItemsRequest::default()))
            .await
            .unwrap()
            .into_inner();
        assert!(list.items.is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_logout() {
        let (service, _) = service_with(Vec::new());
        let token = login(&service, "anna").await;
        let item = service
            .create_item(authed(&token, create("Vulkan", 1, 1.0)))
            .await
            .unwrap()
            .into_inner()
            .item
            .unwrap();

        service
            .delete_item(authed(&token, DeleteItemRequest { id: item.id.clone() }))
            .await
            .unwrap();
        let err = service
            .delete_item(authed(&token, DeleteItemRequest { id: item.id }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);

        service.logout(authed(&token, Empty {})).await.unwrap();
        let err = service
            .get_summary(authed(&token, Empty {}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
    }

    #[tokio::test]
    async fn test_category_filter() {
        let (service, _) = service_with(Vec::new());
        let token = login(&service, "anna").await;
        service
            .create_item(authed(&token, create("Vulkan", 1, 1.0)))
            .await
            .unwrap();
        let mut rocket = create("Rakete", 1, 1.0);
        rocket.category = "Raketen".to_string();
        service.create_item(authed(&token, rocket)).await.unwrap();

        let list = service
            .list_items(authed(
                &token,
                ListItemsRequest {
                    categories: vec!["Raketen".to_string()],
                },
            ))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].name, "Rakete");
        // Summary covers the whole partition, not just the filtered view
        assert_eq!(list.summary.unwrap().total_items, 2);
    }

    #[tokio::test]
    async fn test_create_defaults_count_and_reports_color() {
        let (service, _) = service_with(Vec::new());
        let token = login(&service, "anna").await;

        let mut request = create("Vulkan", 0, 1.0);
        request.count = None;
        request.highlight = "Rot".to_string();
        let item = service
            .create_item(authed(&token, request))
            .await
            .unwrap()
            .into_inner()
            .item
            .unwrap();
        assert_eq!(item.count, 1);
        assert_eq!(item.highlight_color, "#FF4500");

        let zero = service
            .create_item(authed(&token, create("Fontäne", 0, 1.0)))
            .await
            .unwrap()
            .into_inner()
            .item
            .unwrap();
        assert_eq!(zero.count, 0);
        assert_eq!(zero.highlight_color, "transparent");
    }

    #[tokio::test]
    async fn test_replace_items_rewrites_partition() {
        let (service, table) = service_with(Vec::new());
        let token = login(&service, "anna").await;
        service
            .create_item(authed(&token, create("Vulkan", 1, 1.0)))
            .await
            .unwrap();

        let edited = Item {
            name: "Rakete".to_string(),
            category: "Raketen".to_string(),
            count: 4,
            unit_mass: 2.5,
            highlight: "Green".to_string(),
            ..Default::default()
        };
        let response = service
            .replace_items(authed(&token, ReplaceItemsRequest { items: vec![edited] }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.items.len(), 1);
        assert_eq!(response.items[0].owner, "anna");
        assert_eq!(response.items[0].highlight, "Grün");
        assert_eq!(response.summary.unwrap().total_items, 4);

        let grid = table.snapshot().await;
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[1], vec!["anna", "Rakete", "Raketen", "4", "2.5", "", "Grün"]);
    }

    struct CountingConnector {
        table: Arc<MemoryTable>,
        connects: AtomicUsize,
    }

    #[tonic::async_trait]
    impl StoreConnector for CountingConnector {
        async fn connect(&self) -> AppResult<Option<Arc<dyn TableStore>>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Some(self.table.clone()))
        }

        fn configuration_problem(&self) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn test_logout_forces_reconnect() {
        let connector = Arc::new(CountingConnector {
            table: Arc::new(MemoryTable::new("Tabelle1")),
            connects: AtomicUsize::new(0),
        });
        let engine = SyncEngine::new(ConnectionCache::new(
            connector.clone(),
            DEFAULT_CONNECTION_TTL,
        ));
        let service =
            InventoryServiceImpl::new(Arc::new(engine), Arc::new(SessionRegistry::new()));

        let token = login(&service, "anna").await;
        service
            .get_summary(authed(&token, Empty {}))
            .await
            .unwrap();
        service
            .get_summary(authed(&token, Empty {}))
            .await
            .unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);

        service.logout(authed(&token, Empty {})).await.unwrap();

        let token = login(&service, "anna").await;
        service
            .get_summary(authed(&token, Empty {}))
            .await
            .unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }
}
