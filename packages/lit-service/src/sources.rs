use std::{collections::BTreeMap, future::Future, sync::Arc, time::Duration};

use futures::{StreamExt, future, stream};

use lit_domain::{SearchQuery, SourceTag};
use lit_providers::{SourceConnector, connector::split_id};

/// Enabled connectors, addressable by source tag.
#[derive(Clone, Default)]
pub struct SourceSet {
	connectors: Vec<Arc<dyn SourceConnector>>,
}
impl SourceSet {
	pub fn new(connectors: Vec<Arc<dyn SourceConnector>>) -> Self {
		Self { connectors }
	}

	pub fn get(&self, tag: SourceTag) -> Option<&Arc<dyn SourceConnector>> {
		self.connectors.iter().find(|connector| connector.tag() == tag)
	}

	/// Connectors the query asks for, in configuration order.
	pub fn targeted<'a>(
		&'a self,
		query: &'a SearchQuery,
	) -> impl Iterator<Item = &'a Arc<dyn SourceConnector>> + 'a {
		self.connectors.iter().filter(|connector| query.targets(connector.tag()))
	}

	/// Connector able to resolve a canonical id. The prefix names the source; `doi:` and
	/// unprefixed ids go to the citation source.
	pub fn for_id(
		&self,
		id: &str,
		citation_source: SourceTag,
	) -> Option<&Arc<dyn SourceConnector>> {
		match split_id(id).0.and_then(SourceTag::from_id_prefix) {
			Some(tag) => self.get(tag),
			None => self.get(citation_source),
		}
	}

	pub fn rate_limited(&self) -> u64 {
		self.connectors.iter().map(|connector| connector.stats().rate_limited).sum()
	}
}

/// Runs one bounded call per item against the item's connector.
///
/// Calls to one connector are admitted a few at a time so that waiting on its pacer stays
/// well inside `call_timeout`, which starts when a call is admitted. Different connectors
/// proceed concurrently. Results keep item order; `None` marks a call that timed out.
pub async fn fan_out<'a, T, R, F, Fut>(
	items: Vec<(&'a Arc<dyn SourceConnector>, T)>,
	call_timeout: Duration,
	call: F,
) -> Vec<(&'a Arc<dyn SourceConnector>, T, Option<R>)>
where
	T: Clone,
	F: Fn(&'a Arc<dyn SourceConnector>, T) -> Fut,
	Fut: Future<Output = R>,
{
	let mut groups: BTreeMap<SourceTag, (&'a Arc<dyn SourceConnector>, Vec<(usize, T)>)> =
		BTreeMap::new();

	for (index, (connector, item)) in items.into_iter().enumerate() {
		groups
			.entry(connector.tag())
			.or_insert_with(|| (connector, Vec::new()))
			.1
			.push((index, item));
	}

	let call = &call;
	let runs = groups.into_values().map(|(connector, items)| {
		let lanes = lanes(connector.min_interval(), call_timeout, items.len());

		stream::iter(items)
			.map(move |(index, item)| {
				let pending = call(connector, item.clone());

				async move {
					let outcome = tokio::time::timeout(call_timeout, pending).await.ok();

					(index, connector, item, outcome)
				}
			})
			.buffered(lanes)
			.collect::<Vec<_>>()
	});
	let mut done: Vec<_> = future::join_all(runs).await.into_iter().flatten().collect();

	done.sort_by_key(|(index, ..)| *index);

	done.into_iter().map(|(_, connector, item, outcome)| (connector, item, outcome)).collect()
}

/// Concurrent calls allowed against one connector: unbounded without pacing, otherwise
/// enough that the pacer queue fills at most half of the call timeout.
fn lanes(min_interval: Duration, call_timeout: Duration, calls: usize) -> usize {
	let calls = calls.max(1);

	if min_interval.is_zero() {
		return calls;
	}

	let budget = call_timeout.as_millis() / 2;
	let lanes = budget / min_interval.as_millis().max(1);

	usize::try_from(lanes).unwrap_or(usize::MAX).clamp(1, calls)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lanes_keep_pacer_queue_inside_half_the_timeout() {
		let timeout = Duration::from_millis(250);

		assert_eq!(lanes(Duration::from_millis(100), timeout, 8), 1);
		assert_eq!(lanes(Duration::from_millis(10), timeout, 8), 8);
		assert_eq!(lanes(Duration::from_millis(25), timeout, 20), 5);
		assert_eq!(lanes(Duration::from_secs(2), timeout, 3), 1);
		assert_eq!(lanes(Duration::ZERO, timeout, 12), 12);
		assert_eq!(lanes(Duration::ZERO, timeout, 0), 1);
	}
}
