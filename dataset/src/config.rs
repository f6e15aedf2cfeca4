//! Configuration of a [crate::Dataset] and its defaults.

use crate::{accept_all, Error, Filter, Stats};

/// Configuration for a [crate::Dataset].
pub struct Config<T> {
    /// The number of records held by each page.
    ///
    /// Must be greater than zero.
    pub page_size: usize,

    /// The number of records on either side of the read cursor to request.
    ///
    /// Defaults to `page_size`.
    pub load_horizon: Option<u64>,

    /// The number of records on either side of the read cursor to retain.
    ///
    /// Must not be less than the load horizon. `None` retains every page.
    pub unload_horizon: Option<u64>,

    /// The read cursor to plan around during construction.
    ///
    /// If `None`, nothing is requested until the cursor is first set.
    pub initial_read_offset: Option<u64>,

    /// Predicate hiding resolved records. Defaults to accepting every record.
    pub filter: Option<Filter<T>>,

    /// What is known about the sequence before anything is fetched.
    pub stats: Stats,
}

impl<T> Config<T> {
    /// Create a configuration with default horizons for pages of `page_size` records.
    pub const fn new(page_size: usize) -> Self {
        Self {
            page_size,
            load_horizon: None,
            unload_horizon: None,
            initial_read_offset: None,
            filter: None,
            stats: Stats { total_pages: None },
        }
    }

    /// The effective load horizon.
    pub fn load_horizon(&self) -> u64 {
        self.load_horizon.unwrap_or(self.page_size as u64)
    }

    /// The effective filter.
    pub fn filter(&self) -> Filter<T>
    where
        T: 'static,
    {
        self.filter.clone().unwrap_or_else(accept_all)
    }

    /// Ensure the configuration can back a dataset.
    pub fn validate(&self) -> Result<(), Error> {
        if self.page_size == 0 {
            return Err(Error::InvalidPageSize);
        }
        let load = self.load_horizon();
        if let Some(unload) = self.unload_horizon {
            if unload < load {
                return Err(Error::InvalidHorizons { load, unload });
            }
        }
        Ok(())
    }
}

impl<T> Clone for Config<T> {
    fn clone(&self) -> Self {
        Self {
            page_size: self.page_size,
            load_horizon: self.load_horizon,
            unload_horizon: self.unload_horizon,
            initial_read_offset: self.initial_read_offset,
            filter: self.filter.clone(),
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: Config<u64> = Config::new(10);
        assert!(config.validate().is_ok());
        assert_eq!(config.load_horizon(), 10);
        assert_eq!(config.unload_horizon, None);
        assert_eq!(config.initial_read_offset, None);
        assert!(config.filter()(&3));
    }

    #[test]
    fn test_config_invalid_page_size() {
        let config: Config<u64> = Config::new(0);
        assert_eq!(config.validate(), Err(Error::InvalidPageSize));
    }

    #[test]
    fn test_config_invalid_horizons() {
        let mut config: Config<u64> = Config::new(10);
        config.load_horizon = Some(30);
        config.unload_horizon = Some(20);
        assert_eq!(
            config.validate(),
            Err(Error::InvalidHorizons {
                load: 30,
                unload: 20
            })
        );

        // The default load horizon is checked too
        config.load_horizon = None;
        config.unload_horizon = Some(5);
        assert_eq!(
            config.validate(),
            Err(Error::InvalidHorizons { load: 10, unload: 5 })
        );

        config.unload_horizon = Some(10);
        assert!(config.validate().is_ok());
    }
}
