//! DynamoDB document store.
//!
//! Implements [`DocumentStore`] from `authkv_core::storage` using DynamoDB.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, DeleteRequest, ReturnValue, WriteRequest};
use aws_sdk_dynamodb::Client;

use authkv_core::keys::PhysicalKey;
use authkv_core::storage::{
    BatchWriteOutcome, DocumentStore, Item, ScanRequest, StoreError, UpdateRequest,
};

use super::client::create_client;
use super::conversions::{
    attributes_to_item, expression_names, expression_values, item_to_attributes,
    key_to_attributes,
};
use super::error::{
    map_batch_write_error, map_build_error, map_delete_item_error, map_get_item_error,
    map_put_item_error, map_scan_error, map_update_item_error,
};
use crate::config::AwsConfig;

/// DynamoDB-backed [`DocumentStore`].
///
/// The client is built once and shared by every request.
#[derive(Debug, Clone)]
pub struct DynamoDbStore {
    client: Client,
}

impl DynamoDbStore {
    /// Creates a store with the given DynamoDB client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a store with a client built from `config`.
    pub async fn from_config(config: &AwsConfig) -> Self {
        Self::new(create_client(config).await)
    }
}

#[async_trait]
impl DocumentStore for DynamoDbStore {
    async fn get_item(&self, table: &str, key: &PhysicalKey) -> Result<Option<Item>, StoreError> {
        let result = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(key_to_attributes(key)))
            .send()
            .await
            .map_err(|e| map_get_item_error(e, table))?;

        result.item.as_ref().map(attributes_to_item).transpose()
    }

    async fn put_item(&self, table: &str, item: Item) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(item_to_attributes(&item)))
            .send()
            .await
            .map_err(|e| map_put_item_error(e, table))?;

        Ok(())
    }

    async fn update_item(&self, request: UpdateRequest) -> Result<Item, StoreError> {
        let result = self
            .client
            .update_item()
            .table_name(&request.table)
            .set_key(Some(key_to_attributes(&request.key)))
            .update_expression(&request.update.expression)
            .set_expression_attribute_names(expression_names(&request.update.names))
            .set_expression_attribute_values(expression_values(&request.update.values))
            .set_condition_expression(request.condition.clone())
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| map_update_item_error(e, &request.table))?;

        result
            .attributes
            .as_ref()
            .map(attributes_to_item)
            .transpose()
            .map(Option::unwrap_or_default)
    }

    async fn delete_item(&self, table: &str, key: &PhysicalKey) -> Result<(), StoreError> {
        self.client
            .delete_item()
            .table_name(table)
            .set_key(Some(key_to_attributes(key)))
            .send()
            .await
            .map_err(|e| map_delete_item_error(e, table))?;

        Ok(())
    }

    async fn scan(&self, request: ScanRequest) -> Result<Vec<Item>, StoreError> {
        if request.limit == Some(0) {
            return Ok(Vec::new());
        }

        let (filter, names, values) = match &request.filter {
            Some(f) => (
                Some(f.expression.clone()),
                expression_names(&f.names),
                expression_values(&f.values),
            ),
            None => (None, None, None),
        };

        let mut items = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        // Scan pages until the table is exhausted or enough items matched.
        loop {
            // `Limit` caps evaluated items, not matches. It only doubles as a
            // match count when there is no filter.
            let page_limit = match (&filter, request.limit) {
                (None, Some(limit)) => {
                    Some(i32::try_from(limit.saturating_sub(items.len())).unwrap_or(i32::MAX))
                }
                _ => None,
            };

            let page = self
                .client
                .scan()
                .table_name(&request.table)
                .set_filter_expression(filter.clone())
                .set_expression_attribute_names(names.clone())
                .set_expression_attribute_values(values.clone())
                .set_exclusive_start_key(start_key.take())
                .set_limit(page_limit)
                .send()
                .await
                .map_err(|e| map_scan_error(e, &request.table))?;

            for item in page.items() {
                items.push(attributes_to_item(item)?);
            }

            if let Some(limit) = request.limit {
                if items.len() >= limit {
                    items.truncate(limit);
                    break;
                }
            }

            match page.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        tracing::debug!(table = %request.table, count = items.len(), "scan completed");
        Ok(items)
    }

    async fn batch_delete(
        &self,
        table: &str,
        keys: &[PhysicalKey],
    ) -> Result<BatchWriteOutcome, StoreError> {
        if keys.is_empty() {
            return Ok(BatchWriteOutcome::default());
        }

        let requests = keys
            .iter()
            .map(|key| {
                DeleteRequest::builder()
                    .set_key(Some(key_to_attributes(key)))
                    .build()
                    .map(|delete| WriteRequest::builder().delete_request(delete).build())
                    .map_err(map_build_error)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let result = self
            .client
            .batch_write_item()
            .request_items(table, requests)
            .send()
            .await
            .map_err(|e| map_batch_write_error(e, table))?;

        let unprocessed = result
            .unprocessed_items
            .as_ref()
            .and_then(|items| items.get(table))
            .map_or(0, Vec::len);

        Ok(BatchWriteOutcome {
            processed: keys.len().saturating_sub(unprocessed),
            unprocessed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use aws_sdk_dynamodb::config::{BehaviorVersion, Credentials, Region};
    use authkv_core::condition::Condition;
    use authkv_core::expression::compile_filter;
    use serde_json::{json, Value};
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    /// A one-table DynamoDB endpoint that answers Scan like the service:
    /// `Limit` and the page size bound the rows evaluated, and the filter
    /// (a single string equality) is applied afterwards.
    #[derive(Clone)]
    struct FakeTable {
        rows: Arc<Vec<Item>>,
        page_size: usize,
        scans: Arc<AtomicUsize>,
    }

    impl FakeTable {
        fn scan(&self, request: &Value) -> Value {
            self.scans.fetch_add(1, Ordering::SeqCst);

            let start = request["ExclusiveStartKey"]["id"]["S"]
                .as_str()
                .and_then(|id| self.rows.iter().position(|row| row["id"] == id))
                .map_or(0, |index| index + 1);
            let page = request["Limit"]
                .as_u64()
                .map_or(self.page_size, |limit| (limit as usize).min(self.page_size));
            let end = (start + page).min(self.rows.len());

            let filter = request["ExpressionAttributeNames"]
                .as_object()
                .and_then(|names| names.values().next())
                .and_then(Value::as_str)
                .zip(request["ExpressionAttributeValues"][":val0"]["S"].as_str());

            let items: Vec<Value> = self.rows[start..end]
                .iter()
                .filter(|row| filter.map_or(true, |(field, value)| row[field] == value))
                .map(|row| {
                    Value::Object(
                        row.iter()
                            .map(|(name, value)| (name.clone(), json!({ "S": value })))
                            .collect(),
                    )
                })
                .collect();

            let mut response = json!({
                "Items": items,
                "Count": items.len(),
                "ScannedCount": end - start,
            });
            if end < self.rows.len() {
                response["LastEvaluatedKey"] = json!({ "id": { "S": self.rows[end - 1]["id"] } });
            }
            response
        }
    }

    async fn handle_connection(socket: TcpStream, table: FakeTable) -> std::io::Result<()> {
        let (read, mut write) = socket.into_split();
        let mut reader = BufReader::new(read);

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }

            let mut content_length = 0;
            let mut target = String::new();
            loop {
                line.clear();
                reader.read_line(&mut line).await?;
                let header = line.trim_end();
                if header.is_empty() {
                    break;
                }
                if let Some((name, value)) = header.split_once(':') {
                    match name.trim().to_ascii_lowercase().as_str() {
                        "content-length" => content_length = value.trim().parse().unwrap_or(0),
                        "x-amz-target" => target = value.trim().to_string(),
                        _ => {}
                    }
                }
            }

            let mut body = vec![0; content_length];
            reader.read_exact(&mut body).await?;
            let request: Value = serde_json::from_slice(&body).unwrap_or_default();

            let payload = if target.ends_with(".Scan") {
                table.scan(&request).to_string()
            } else {
                "{}".to_string()
            };
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/x-amz-json-1.0\r\nContent-Length: {}\r\n\r\n{payload}",
                payload.len()
            );
            write.write_all(response.as_bytes()).await?;
        }
    }

    /// Serves `rows` and returns a store pointed at it plus the Scan counter.
    async fn fake_store(rows: Vec<Item>, page_size: usize) -> (DynamoDbStore, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let scans = Arc::new(AtomicUsize::new(0));
        let table = FakeTable {
            rows: Arc::new(rows),
            page_size,
            scans: Arc::clone(&scans),
        };

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(handle_connection(socket, table.clone()));
            }
        });

        let config = aws_sdk_dynamodb::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(format!("http://{addr}"))
            .credentials_provider(Credentials::new("test", "test", None, None, "test"))
            .build();

        (DynamoDbStore::new(Client::from_conf(config)), scans)
    }

    fn users(count: usize, matching: usize) -> Vec<Item> {
        (0..count)
            .map(|i| {
                let email = if i == matching {
                    "target".to_string()
                } else {
                    format!("user{i}@example.com")
                };
                match json!({ "id": format!("k{i}"), "email": email }) {
                    Value::Object(map) => map,
                    _ => unreachable!(),
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_filtered_scan_pages_by_table_not_by_match() {
        let (store, scans) = fake_store(users(50, 49), 20).await;
        let filter = compile_filter(&[Condition::eq("email", "target")]).unwrap();

        let found = store
            .scan(ScanRequest::new("user").with_filter(filter).with_limit(Some(1)))
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["id"], json!("k49"));
        // 50 rows in pages of 20.
        assert_eq!(scans.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_filtered_scan_stops_once_enough_matched() {
        let (store, scans) = fake_store(users(50, 3), 20).await;
        let filter = compile_filter(&[Condition::eq("email", "target")]).unwrap();

        let found = store
            .scan(ScanRequest::new("user").with_filter(filter).with_limit(Some(1)))
            .await
            .unwrap();

        assert_eq!(found[0]["id"], json!("k3"));
        assert_eq!(scans.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unfiltered_scan_limits_the_page() {
        let (store, scans) = fake_store(users(50, 0), 20).await;

        let found = store
            .scan(ScanRequest::new("user").with_limit(Some(2)))
            .await
            .unwrap();

        let ids: Vec<&Value> = found.iter().map(|item| &item["id"]).collect();
        assert_eq!(ids, vec![&json!("k0"), &json!("k1")]);
        assert_eq!(scans.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unlimited_scan_reads_every_page() {
        let (store, scans) = fake_store(users(50, 0), 20).await;

        let found = store.scan(ScanRequest::new("user")).await.unwrap();

        assert_eq!(found.len(), 50);
        assert_eq!(scans.load(Ordering::SeqCst), 3);
    }
}
